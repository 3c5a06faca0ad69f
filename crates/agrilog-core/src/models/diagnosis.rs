//! Plant disease diagnosis results

use std::fmt;
use std::str::FromStr;

use libsql::{Row, Value as SqlValue};
use serde::{Deserialize, Serialize};

use super::record::{json_list, nullable, Collection, Envelope, SyncRecord, FIELD_OFFSET};
use crate::{Error, Result};

/// Risk level produced by a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    #[default]
    None,
}

impl RiskLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "none" => Ok(Self::None),
            other => Err(Error::InvalidInput(format!("Unknown risk level: {other}"))),
        }
    }
}

/// Outcome of a symptom-based diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub date: String,
    #[serde(default, with = "json_list")]
    pub selected_symptoms: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub result_title: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub result_description: String,
    #[serde(default, with = "json_list")]
    pub recommendations: Vec<String>,
}

/// Fields for a new diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDiagnosis {
    pub date: String,
    pub selected_symptoms: Vec<String>,
    pub risk_level: RiskLevel,
    pub result_title: String,
    pub result_description: String,
    pub recommendations: Vec<String>,
}

impl DiagnosisRecord {
    pub fn new(device_id: &str, fields: NewDiagnosis) -> Self {
        Self {
            envelope: Envelope::new(device_id),
            date: fields.date,
            selected_symptoms: fields.selected_symptoms,
            risk_level: fields.risk_level,
            result_title: fields.result_title,
            result_description: fields.result_description,
            recommendations: fields.recommendations,
        }
    }
}

impl SyncRecord for DiagnosisRecord {
    const COLLECTION: Collection = Collection::DiagnosisRecords;
    const FIELDS: &'static [&'static str] = &[
        "date",
        "selected_symptoms",
        "risk_level",
        "result_title",
        "result_description",
        "recommendations",
    ];
    const ORDER_BY: &'static str = "date DESC, created_at DESC";

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn field_values(&self) -> Result<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.date.clone()),
            SqlValue::Text(serde_json::to_string(&self.selected_symptoms)?),
            SqlValue::Text(self.risk_level.as_str().to_string()),
            SqlValue::Text(self.result_title.clone()),
            SqlValue::Text(self.result_description.clone()),
            SqlValue::Text(serde_json::to_string(&self.recommendations)?),
        ])
    }

    fn from_row(envelope: Envelope, row: &Row) -> Result<Self> {
        let symptoms: String = row.get(FIELD_OFFSET + 1)?;
        let risk: String = row.get(FIELD_OFFSET + 2)?;
        let recommendations: String = row.get(FIELD_OFFSET + 5)?;
        Ok(Self {
            envelope,
            date: row.get(FIELD_OFFSET)?,
            selected_symptoms: json_list::parse(&symptoms)?,
            risk_level: risk.parse()?,
            result_title: row.get(FIELD_OFFSET + 3)?,
            result_description: row.get(FIELD_OFFSET + 4)?,
            recommendations: json_list::parse(&recommendations)?,
        })
    }
}
