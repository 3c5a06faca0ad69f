use agrilog_core::models::{LogEntry, LogEntryPatch, NewLogEntry};
use agrilog_core::FieldLog;

use crate::cli::LogCommands;
use crate::commands::common::{
    photo_uri, print_json, print_lines, require, resolve_date, sync_marker, validate_date,
};
use crate::error::CliError;

pub async fn run_log(log: &FieldLog, command: LogCommands) -> Result<(), CliError> {
    match command {
        LogCommands::Add {
            block,
            activity,
            date,
            notes,
            photo,
        } => {
            require("Block", &block)?;
            require("Activity", &activity)?;
            let photo = photo.as_deref().map(photo_uri).transpose()?;
            let entry = log
                .add_log_entry(NewLogEntry {
                    date: resolve_date(date)?,
                    block,
                    activity,
                    notes: notes.unwrap_or_default(),
                    photo,
                })
                .await?;
            println!("{}", entry.envelope.id);
        }
        LogCommands::List { date, json } => {
            let entries = match validate_date(date)? {
                Some(date) => log.log_entries_on(&date).await?,
                None => log.log_entries().await?,
            };
            if json {
                print_json(&entries)?;
            } else {
                print_lines(entries.iter().map(format_log_line), "No log entries.");
            }
        }
        LogCommands::Update {
            id,
            block,
            activity,
            date,
            notes,
            photo,
        } => {
            let patch = LogEntryPatch {
                date: validate_date(date)?,
                block,
                activity,
                notes,
                photo: photo.as_deref().map(photo_uri).transpose()?,
            };
            let entry = log
                .update_log_entry(&id, patch)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("{}", format_log_line(&entry));
        }
        LogCommands::Delete { id } => {
            log.delete_log_entry(&id)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

pub fn format_log_line(entry: &LogEntry) -> String {
    let mut line = format!(
        "{}{} {} [{}] {}",
        sync_marker(&entry.envelope),
        entry.envelope.id,
        entry.date,
        entry.block,
        entry.activity
    );
    if !entry.notes.is_empty() {
        line.push_str(&format!(" - {}", entry.notes));
    }
    if entry.photo.is_some() {
        line.push_str(" (photo)");
    }
    line
}
