use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] agrilog_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyInput(&'static str),
    #[error("No record found for id: {0}")]
    UnknownRecord(String),
    #[error("Invalid date {0:?}; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error(
        "Sync is not configured. Set remote_base_url in the config file or AGRILOG_REMOTE_URL."
    )]
    SyncNotConfigured,
    #[error("Initialization aborted: {0}")]
    InitAborted(String),
}

impl CliError {
    /// Map a core not-found error onto the id the user typed.
    pub fn for_record(error: agrilog_core::Error, id: &str) -> Self {
        match error {
            agrilog_core::Error::NotFound(_) => Self::UnknownRecord(id.to_string()),
            other => Self::Core(other),
        }
    }
}
