//! Harvest records

use libsql::{Row, Value as SqlValue};
use serde::{Deserialize, Serialize};

use super::record::{nullable, Collection, Envelope, SyncRecord, FIELD_OFFSET};
use crate::Result;

/// Quality grade applied when none is given.
pub const DEFAULT_QUALITY: &str = "Grade B";

fn default_quality() -> String {
    DEFAULT_QUALITY.to_string()
}

/// Quantity picked from a block on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub date: String,
    pub block: String,
    /// Quantity in kilograms
    pub quantity: f64,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub notes: String,
}

/// Fields for a new harvest record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHarvest {
    pub date: String,
    pub block: String,
    pub quantity: f64,
    pub quality: String,
    pub notes: String,
}

impl Default for NewHarvest {
    fn default() -> Self {
        Self {
            date: String::new(),
            block: String::new(),
            quantity: 0.0,
            quality: default_quality(),
            notes: String::new(),
        }
    }
}

/// Partial update of a harvest record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestPatch {
    pub date: Option<String>,
    pub block: Option<String>,
    pub quantity: Option<f64>,
    pub quality: Option<String>,
    pub notes: Option<String>,
}

impl HarvestPatch {
    pub const fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.block.is_none()
            && self.quantity.is_none()
            && self.quality.is_none()
            && self.notes.is_none()
    }
}

impl HarvestRecord {
    pub fn new(device_id: &str, fields: NewHarvest) -> Self {
        Self {
            envelope: Envelope::new(device_id),
            date: fields.date,
            block: fields.block,
            quantity: fields.quantity,
            quality: fields.quality,
            notes: fields.notes,
        }
    }

    pub fn apply(&mut self, patch: HarvestPatch) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(block) = patch.block {
            self.block = block;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        if let Some(quality) = patch.quality {
            self.quality = quality;
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
        self.envelope.touch();
    }
}

impl SyncRecord for HarvestRecord {
    const COLLECTION: Collection = Collection::HarvestRecords;
    const FIELDS: &'static [&'static str] = &["date", "block", "quantity", "quality", "notes"];
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
            SqlValue::Text(self.block.clone()),
            SqlValue::Real(self.quantity),
            SqlValue::Text(self.quality.clone()),
            SqlValue::Text(self.notes.clone()),
        ])
    }

    fn from_row(envelope: Envelope, row: &Row) -> Result<Self> {
        Ok(Self {
            envelope,
            date: row.get(FIELD_OFFSET)?,
            block: row.get(FIELD_OFFSET + 1)?,
            quantity: row.get(FIELD_OFFSET + 2)?,
            quality: row.get(FIELD_OFFSET + 3)?,
            notes: row.get::<Option<String>>(FIELD_OFFSET + 4)?.unwrap_or_default(),
        })
    }
}
