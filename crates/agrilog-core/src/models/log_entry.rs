//! Daily field activity log

use libsql::{Row, Value as SqlValue};
use serde::{Deserialize, Serialize};

use super::record::{nullable, optional_text, Collection, Envelope, SyncRecord, FIELD_OFFSET};
use crate::Result;

/// URI scheme of photos that still live on the device.
pub const LOCAL_PHOTO_SCHEME: &str = "file://";

/// One activity recorded in a block on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Activity date (`YYYY-MM-DD`)
    pub date: String,
    pub block: String,
    pub activity: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub notes: String,
    /// `file://` reference before sync, inline data URI after
    #[serde(default)]
    pub photo: Option<String>,
}

/// Fields for a new log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLogEntry {
    pub date: String,
    pub block: String,
    pub activity: String,
    pub notes: String,
    pub photo: Option<String>,
}

/// Partial update of a log entry. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntryPatch {
    pub date: Option<String>,
    pub block: Option<String>,
    pub activity: Option<String>,
    pub notes: Option<String>,
    pub photo: Option<String>,
}

impl LogEntryPatch {
    pub const fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.block.is_none()
            && self.activity.is_none()
            && self.notes.is_none()
            && self.photo.is_none()
    }
}

impl LogEntry {
    pub fn new(device_id: &str, fields: NewLogEntry) -> Self {
        Self {
            envelope: Envelope::new(device_id),
            date: fields.date,
            block: fields.block,
            activity: fields.activity,
            notes: fields.notes,
            photo: fields.photo,
        }
    }

    /// Apply a patch in memory, marking the entry dirty.
    pub fn apply(&mut self, patch: LogEntryPatch) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(block) = patch.block {
            self.block = block;
        }
        if let Some(activity) = patch.activity {
            self.activity = activity;
        }
        if let Some(notes) = patch.notes {
            self.notes = notes;
        }
        if let Some(photo) = patch.photo {
            self.photo = Some(photo);
        }
        self.envelope.touch();
    }
}

/// Whether a photo reference points at an on-device file that must be inlined before push.
pub fn needs_transcoding(photo: &str) -> bool {
    photo.starts_with(LOCAL_PHOTO_SCHEME)
}

impl SyncRecord for LogEntry {
    const COLLECTION: Collection = Collection::LogEntries;
    const FIELDS: &'static [&'static str] = &["date", "block", "activity", "notes", "photo"];
    const ORDER_BY: &'static str = "date DESC, created_at DESC";
    const PAYLOAD_COLUMN: Option<&'static str> = Some("photo");

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
            SqlValue::Text(self.activity.clone()),
            SqlValue::Text(self.notes.clone()),
            optional_text(self.photo.as_deref()),
        ])
    }

    fn from_row(envelope: Envelope, row: &Row) -> Result<Self> {
        Ok(Self {
            envelope,
            date: row.get(FIELD_OFFSET)?,
            block: row.get(FIELD_OFFSET + 1)?,
            activity: row.get(FIELD_OFFSET + 2)?,
            notes: row.get::<Option<String>>(FIELD_OFFSET + 3)?.unwrap_or_default(),
            photo: row.get(FIELD_OFFSET + 4)?,
        })
    }

    fn pending_payload(&self) -> Option<&str> {
        self.photo.as_deref().filter(|photo| needs_transcoding(photo))
    }

    fn set_payload(&mut self, payload: String) {
        self.photo = Some(payload);
    }
}
