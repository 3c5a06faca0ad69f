use agrilog_core::models::{HarvestRecord, NewHarvest, DEFAULT_QUALITY};
use agrilog_core::FieldLog;

use crate::cli::HarvestCommands;
use crate::commands::common::{
    print_json, print_lines, require, resolve_date, sync_marker, validate_date,
};
use crate::error::CliError;

pub async fn run_harvest(log: &FieldLog, command: HarvestCommands) -> Result<(), CliError> {
    match command {
        HarvestCommands::Add {
            block,
            quantity,
            quality,
            date,
            notes,
        } => {
            require("Block", &block)?;
            let record = log
                .add_harvest(NewHarvest {
                    date: resolve_date(date)?,
                    block,
                    quantity,
                    quality: quality
                        .filter(|quality| !quality.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
                    notes: notes.unwrap_or_default(),
                })
                .await?;
            println!("{}", record.envelope.id);
        }
        HarvestCommands::List { from, to, json } => {
            let from = validate_date(from)?;
            let to = validate_date(to)?;
            let records = if from.is_none() && to.is_none() {
                log.harvests().await?
            } else {
                let from = from.unwrap_or_else(|| "0000-01-01".to_string());
                let to = to.unwrap_or_else(|| "9999-12-31".to_string());
                log.harvests_between(&from, &to).await?
            };
            if json {
                print_json(&records)?;
            } else {
                print_lines(records.iter().map(format_harvest_line), "No harvests.");
                if !records.is_empty() {
                    let total: f64 = records.iter().map(|record| record.quantity).sum();
                    println!("Total: {total:.1} kg");
                }
            }
        }
        HarvestCommands::Delete { id } => {
            log.delete_harvest(&id)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

pub fn format_harvest_line(record: &HarvestRecord) -> String {
    format!(
        "{}{} {} [{}] {:.1} kg {}",
        sync_marker(&record.envelope),
        record.envelope.id,
        record.date,
        record.block,
        record.quantity,
        record.quality
    )
}
