use agrilog_core::models::{NewPlant, Plant};
use agrilog_core::FieldLog;

use crate::cli::PlantCommands;
use crate::commands::common::{print_json, print_lines, require, sync_marker, validate_date};
use crate::error::CliError;

pub async fn run_plant(log: &FieldLog, command: PlantCommands) -> Result<(), CliError> {
    match command {
        PlantCommands::Add {
            block,
            name,
            status,
            planted_date,
        } => {
            require("Block", &block)?;
            require("Name", &name)?;
            let plant = log
                .add_plant(NewPlant {
                    block,
                    name,
                    status,
                    planted_date: validate_date(planted_date)?,
                    notes: String::new(),
                })
                .await?;
            println!("{}", plant.envelope.id);
        }
        PlantCommands::Bulk {
            block,
            count,
            prefix,
            planted_date,
        } => {
            require("Block", &block)?;
            let added = log
                .add_plants_bulk(
                    &block,
                    count,
                    prefix.as_deref(),
                    validate_date(planted_date)?,
                )
                .await?;
            println!("Added {added} plants to {block}");
        }
        PlantCommands::Status { id, status } => {
            log.update_plant_status(&id, status)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("{id} is now {status}");
        }
        PlantCommands::BlockStatus {
            block,
            from,
            to,
            count,
        } => {
            require("Block", &block)?;
            let changed = log
                .update_plant_status_by_block(&block, from, to, count)
                .await?;
            println!("Moved {changed} plants in {block} from {from} to {to}");
        }
        PlantCommands::List { json } => {
            let plants = log.plants().await?;
            if json {
                print_json(&plants)?;
            } else {
                print_lines(plants.iter().map(format_plant_line), "No plants.");
            }
        }
        PlantCommands::Delete { id } => {
            log.delete_plant(&id)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

pub fn format_plant_line(plant: &Plant) -> String {
    let mut line = format!(
        "{}{} [{}] {} ({})",
        sync_marker(&plant.envelope),
        plant.envelope.id,
        plant.block,
        plant.name,
        plant.status
    );
    if let Some(planted) = &plant.planted_date {
        line.push_str(&format!(" planted {planted}"));
    }
    line
}
