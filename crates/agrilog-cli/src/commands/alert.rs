use agrilog_core::models::AlertRecord;
use agrilog_core::FieldLog;

use crate::cli::AlertCommands;
use crate::commands::common::{print_json, print_lines, require, sync_marker};
use crate::error::CliError;

pub async fn run_alert(log: &FieldLog, command: AlertCommands) -> Result<(), CliError> {
    match command {
        AlertCommands::Add {
            message,
            severity,
            block,
        } => {
            require("Message", &message)?;
            let alert = log.add_alert(&message, severity, block).await?;
            println!("{}", alert.envelope.id);
        }
        AlertCommands::List { unread, json } => {
            let alerts = if unread {
                log.unread_alerts().await?
            } else {
                log.alerts().await?
            };
            if json {
                print_json(&alerts)?;
            } else {
                print_lines(alerts.iter().map(format_alert_line), "No alerts.");
            }
        }
        AlertCommands::Read { id } => {
            log.mark_alert_read(&id)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("Marked {id} read");
        }
        AlertCommands::Delete { id } => {
            log.delete_alert(&id)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

pub fn format_alert_line(alert: &AlertRecord) -> String {
    let read = if alert.is_read { " " } else { "!" };
    let block = alert
        .block
        .as_deref()
        .map(|block| format!(" [{block}]"))
        .unwrap_or_default();
    format!(
        "{}{read}{} {}{block} {}",
        sync_marker(&alert.envelope),
        alert.envelope.id,
        alert.severity,
        alert.message
    )
}
