use agrilog_core::FieldLog;

use crate::error::CliError;

pub async fn run_device(log: &FieldLog) -> Result<(), CliError> {
    println!("{}", log.device_id().await?);
    Ok(())
}
