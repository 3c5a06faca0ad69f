use agrilog_core::models::{DiagnosisRecord, NewDiagnosis};
use agrilog_core::FieldLog;

use crate::cli::DiagnosisCommands;
use crate::commands::common::{print_json, print_lines, require, resolve_date, sync_marker};
use crate::error::CliError;

pub async fn run_diagnosis(log: &FieldLog, command: DiagnosisCommands) -> Result<(), CliError> {
    match command {
        DiagnosisCommands::Add {
            title,
            description,
            risk,
            symptoms,
            recommendations,
            date,
        } => {
            require("Title", &title)?;
            let record = log
                .add_diagnosis(NewDiagnosis {
                    date: resolve_date(date)?,
                    selected_symptoms: non_empty(symptoms),
                    risk_level: risk,
                    result_title: title,
                    result_description: description,
                    recommendations: non_empty(recommendations),
                })
                .await?;
            println!("{}", record.envelope.id);
        }
        DiagnosisCommands::List { json } => {
            let records = log.diagnoses().await?;
            if json {
                print_json(&records)?;
            } else {
                print_lines(records.iter().map(format_diagnosis_line), "No diagnoses.");
            }
        }
        DiagnosisCommands::Delete { id } => {
            log.delete_diagnosis(&id)
                .await
                .map_err(|error| CliError::for_record(error, &id))?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

pub fn format_diagnosis_line(record: &DiagnosisRecord) -> String {
    format!(
        "{}{} {} {} (risk: {}, {} symptoms)",
        sync_marker(&record.envelope),
        record.envelope.id,
        record.date,
        record.result_title,
        record.risk_level,
        record.selected_symptoms.len()
    )
}
