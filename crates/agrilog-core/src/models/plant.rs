//! Plant registry

use std::fmt;
use std::str::FromStr;

use libsql::{Row, Value as SqlValue};
use serde::{Deserialize, Serialize};

use super::record::{nullable, optional_text, Collection, Envelope, SyncRecord, FIELD_OFFSET};
use crate::{Error, Result};

/// Health status of a single plant.
///
/// Older installations recorded statuses in Indonesian; those values are
/// still accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlantStatus {
    #[default]
    #[serde(rename = "healthy", alias = "sehat")]
    Healthy,
    #[serde(rename = "attention", alias = "perhatian")]
    Attention,
    #[serde(rename = "sick", alias = "sakit")]
    Sick,
}

impl PlantStatus {
    pub const ALL: [Self; 3] = [Self::Healthy, Self::Attention, Self::Sick];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Attention => "attention",
            Self::Sick => "sick",
        }
    }
}

impl fmt::Display for PlantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlantStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "healthy" | "sehat" => Ok(Self::Healthy),
            "attention" | "perhatian" => Ok(Self::Attention),
            "sick" | "sakit" => Ok(Self::Sick),
            other => Err(Error::InvalidInput(format!("Unknown plant status: {other}"))),
        }
    }
}

/// A tracked plant in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plant {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub block: String,
    pub name: String,
    #[serde(default)]
    pub status: PlantStatus,
    #[serde(default)]
    pub planted_date: Option<String>,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub notes: String,
}

/// Fields for a new plant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPlant {
    pub block: String,
    pub name: String,
    pub status: PlantStatus,
    pub planted_date: Option<String>,
    pub notes: String,
}

impl Plant {
    pub fn new(device_id: &str, fields: NewPlant) -> Self {
        Self {
            envelope: Envelope::new(device_id),
            block: fields.block,
            name: fields.name,
            status: fields.status,
            planted_date: fields.planted_date,
            notes: fields.notes,
        }
    }
}

impl SyncRecord for Plant {
    const COLLECTION: Collection = Collection::Plants;
    const FIELDS: &'static [&'static str] = &["block", "name", "status", "planted_date", "notes"];
    const ORDER_BY: &'static str = "block ASC, name ASC";

    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Envelope {
        &mut self.envelope
    }

    fn field_values(&self) -> Result<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Text(self.block.clone()),
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.status.as_str().to_string()),
            optional_text(self.planted_date.as_deref()),
            SqlValue::Text(self.notes.clone()),
        ])
    }

    fn from_row(envelope: Envelope, row: &Row) -> Result<Self> {
        let status: String = row.get(FIELD_OFFSET + 2)?;
        Ok(Self {
            envelope,
            block: row.get(FIELD_OFFSET)?,
            name: row.get(FIELD_OFFSET + 1)?,
            status: status.parse()?,
            planted_date: row.get(FIELD_OFFSET + 3)?,
            notes: row.get::<Option<String>>(FIELD_OFFSET + 4)?.unwrap_or_default(),
        })
    }
}
