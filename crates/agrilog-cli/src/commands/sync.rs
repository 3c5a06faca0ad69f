use std::sync::Arc;

use agrilog_core::sync::{CycleReport, SkipReason};
use agrilog_core::{SyncEngine, SyncEvent, SyncOutcome, SyncStatus};

use crate::app::App;
use crate::error::CliError;

pub async fn run_sync(app: &App) -> Result<(), CliError> {
    let engine = app.sync_engine()?;
    let outcome = sync_once(&engine).await;
    for line in format_outcome_lines(&outcome) {
        println!("{line}");
    }
    match outcome {
        SyncOutcome::Failed(message) => Err(CliError::Core(agrilog_core::Error::Remote(message))),
        SyncOutcome::Completed(report) if report.all_failed() => Err(CliError::Core(
            agrilog_core::Error::Remote(report.failure_detail()),
        )),
        _ => Ok(()),
    }
}

/// Probe connectivity, then run one cycle.
pub async fn sync_once(engine: &Arc<SyncEngine>) -> SyncOutcome {
    engine.connectivity().check_connection().await;
    engine.sync_all().await
}

pub fn format_outcome_lines(outcome: &SyncOutcome) -> Vec<String> {
    match outcome {
        SyncOutcome::Skipped(SkipReason::Offline) => {
            vec!["Offline; nothing was synced. Changes stay queued locally.".to_string()]
        }
        SyncOutcome::Skipped(reason) => vec![format!("Skipped: {reason}")],
        SyncOutcome::Failed(message) => vec![format!("Sync failed: {message}")],
        SyncOutcome::Completed(report) => format_report_lines(report),
    }
}

pub fn format_report_lines(report: &CycleReport) -> Vec<String> {
    let mut lines = vec![format!("Sync {}: {}", report.status(), report.summary())];
    for collection in &report.collections {
        let pulled = collection.pull.map_or_else(
            || "pull failed".to_string(),
            |pull| format!("pulled {}, removed {}", pull.upserted, pull.removed),
        );
        let pushed = collection.push.map_or_else(
            || "push failed".to_string(),
            |push| {
                let mut text = format!("pushed {}/{}", push.pushed, push.pending);
                if push.skipped > 0 {
                    text.push_str(&format!(", {} skipped", push.skipped));
                }
                if push.failed_records > 0 {
                    text.push_str(&format!(", {} in failed batches", push.failed_records));
                }
                text
            },
        );
        lines.push(format!("  {}: {pulled}; {pushed}", collection.collection));
        lines.extend(
            collection
                .errors
                .iter()
                .map(|error| format!("    {error}")),
        );
    }
    lines
}

pub fn format_event(event: &SyncEvent) -> String {
    match event.status {
        SyncStatus::Syncing => "Syncing...".to_string(),
        _ => event.to_string(),
    }
}
