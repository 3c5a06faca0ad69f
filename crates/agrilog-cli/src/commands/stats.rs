use agrilog_core::models::{DashboardStats, StatusCount, SyncMetadata};
use agrilog_core::services::PendingCount;
use agrilog_core::LocalStore;
use serde::Serialize;

use crate::commands::common::{print_json, resolve_month};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub month: String,
    pub dashboard: DashboardStats,
    pub health: Vec<StatusCount>,
    pub pending: Vec<PendingCount>,
    pub last_synced: Vec<SyncMetadata>,
}

pub async fn collect_stats(
    store: &LocalStore,
    month: Option<String>,
) -> Result<StatsReport, CliError> {
    let month = resolve_month(month)?;
    Ok(StatsReport {
        dashboard: store.dashboard_stats(&month).await?,
        health: store.health_distribution().await?,
        pending: store.pending_counts().await?,
        last_synced: store.sync_metadata().await?,
        month,
    })
}

pub async fn run_stats(
    store: &LocalStore,
    month: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let report = collect_stats(store, month).await?;
    if json {
        return print_json(&report);
    }
    for line in format_stats_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_stats_lines(report: &StatsReport) -> Vec<String> {
    let stats = &report.dashboard;
    let mut lines = vec![
        format!(
            "Plants: {} ({} healthy, {} attention, {} sick)",
            stats.total_plants, stats.healthy, stats.attention, stats.sick
        ),
        format!("Harvest {}: {:.1} kg", report.month, stats.harvest_this_month),
    ];

    let pending: u64 = report.pending.iter().map(|count| count.pending).sum();
    if pending == 0 {
        lines.push("Pending changes: none".to_string());
    } else {
        let detail: Vec<String> = report
            .pending
            .iter()
            .filter(|count| count.pending > 0)
            .map(|count| format!("{} {}", count.pending, count.collection))
            .collect();
        lines.push(format!("Pending changes: {pending} ({})", detail.join(", ")));
    }

    if report.last_synced.is_empty() {
        lines.push("Last synced: never".to_string());
    } else {
        lines.push("Last synced:".to_string());
        lines.extend(
            report
                .last_synced
                .iter()
                .map(|meta| format!("  {}: {}", meta.collection, meta.last_synced_at)),
        );
    }
    lines
}
