//! Farm alerts

use std::fmt;
use std::str::FromStr;

use libsql::{Row, Value as SqlValue};
use serde::{Deserialize, Serialize};

use super::record::{int_bool, optional_text, Collection, Envelope, SyncRecord, FIELD_OFFSET};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Danger,
    Warning,
    Success,
    #[default]
    Info,
}

impl AlertSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Danger => "danger",
            Self::Warning => "warning",
            Self::Success => "success",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "danger" => Ok(Self::Danger),
            "warning" => Ok(Self::Warning),
            "success" => Ok(Self::Success),
            "info" => Ok(Self::Info),
            other => Err(Error::InvalidInput(format!("Unknown alert severity: {other}"))),
        }
    }
}

/// A notice shown on the dashboard until read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub message: String,
    #[serde(default)]
    pub severity: AlertSeverity,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default, with = "int_bool")]
    pub is_read: bool,
}

impl AlertRecord {
    pub fn new(
        device_id: &str,
        message: impl Into<String>,
        severity: AlertSeverity,
        block: Option<String>,
    ) -> Self {
        Self {
            envelope: Envelope::new(device_id),
            message: message.into(),
            severity,
            block,
            is_read: false,
        }
    }
}

impl SyncRecord for AlertRecord {
    const COLLECTION: Collection = Collection::Alerts;
    const FIELDS: &'static [&'static str] = &["message", "severity", "block", "is_read"];

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn field_values(&self) -> Result<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.message.clone()),
            SqlValue::Text(self.severity.as_str().to_string()),
            optional_text(self.block.as_deref()),
            SqlValue::Integer(i64::from(self.is_read)),
        ])
    }

    fn from_row(envelope: Envelope, row: &Row) -> Result<Self> {
        let severity: String = row.get(FIELD_OFFSET + 1)?;
        Ok(Self {
            envelope,
            message: row.get(FIELD_OFFSET)?,
            severity: severity.parse()?,
            block: row.get(FIELD_OFFSET + 2)?,
            is_read: row.get::<i64>(FIELD_OFFSET + 3)? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn is_read_is_encoded_as_integer() {
        let mut alert = AlertRecord::new("device-1", "Hama ulat", AlertSeverity::Danger, None);
        alert.is_read = true;

        let document = alert.to_document().unwrap();

        assert_eq!(document.fields["is_read"], json!(1));
        assert_eq!(document.fields["severity"], json!("danger"));
        assert_eq!(document.fields["block"], json!(null));
    }
}
