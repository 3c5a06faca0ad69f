use std::path::Path;

use agrilog_core::models::{Envelope, LOCAL_PHOTO_SCHEME};
use agrilog_core::util::today;
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::error::CliError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The given date, validated, or today's local date.
pub fn resolve_date(date: Option<String>) -> Result<String, CliError> {
    let Some(date) = date.map(|date| date.trim().to_string()) else {
        return Ok(today());
    };
    if date.is_empty() {
        return Ok(today());
    }
    NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map(|_| date.clone())
        .map_err(|_| CliError::InvalidDate(date))
}

pub fn validate_date(date: Option<String>) -> Result<Option<String>, CliError> {
    date.map(|date| resolve_date(Some(date))).transpose()
}

/// The given `YYYY-MM` month, validated, or the current local month.
pub fn resolve_month(month: Option<String>) -> Result<String, CliError> {
    let Some(month) = month.map(|month| month.trim().to_string()) else {
        return Ok(Local::now().format("%Y-%m").to_string());
    };
    NaiveDate::parse_from_str(&format!("{month}-01"), DATE_FORMAT)
        .map(|_| month.clone())
        .map_err(|_| CliError::InvalidDate(month))
}

/// Absolute `file://` reference for a photo on disk.
pub fn photo_uri(path: &Path) -> Result<String, CliError> {
    let absolute = path.canonicalize()?;
    Ok(format!("{LOCAL_PHOTO_SCHEME}{}", absolute.display()))
}

pub fn require(field: &'static str, value: &str) -> Result<(), CliError> {
    if value.trim().is_empty() {
        Err(CliError::EmptyInput(field))
    } else {
        Ok(())
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Marker shown next to records with unpushed changes.
pub const fn sync_marker(envelope: &Envelope) -> &'static str {
    if envelope.synced {
        " "
    } else {
        "*"
    }
}

/// Print `lines`, or `empty` when there are none.
pub fn print_lines(lines: impl IntoIterator<Item = String>, empty: &str) {
    let mut printed = false;
    for line in lines {
        println!("{line}");
        printed = true;
    }
    if !printed {
        println!("{empty}");
    }
}
