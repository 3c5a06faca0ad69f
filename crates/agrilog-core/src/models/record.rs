//! Sync envelope shared by every entity and the record trait the sync engine is generic over.

use std::fmt;
use std::str::FromStr;

use libsql::{Row, Value as SqlValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::remote::Document;
use crate::util::{generate_id, now_timestamp, EPOCH_TIMESTAMP};
use crate::{Error, Result};

/// Device id recorded for remote documents that carry none.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Envelope columns, in bind order. Entity columns follow them.
pub const ENVELOPE_COLUMNS: [&str; 6] = [
    "id",
    "device_id",
    "created_at",
    "updated_at",
    "synced",
    "deleted",
];

/// Index of the first entity-specific column in a selected row.
pub const FIELD_OFFSET: i32 = 6;

/// One synchronized collection. The local table shares the remote collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    LogEntries,
    DiagnosisRecords,
    HarvestRecords,
    Plants,
    Alerts,
}

impl Collection {
    /// Every collection, in the order they are reported.
    pub const ALL: [Self; 5] = [
        Self::LogEntries,
        Self::DiagnosisRecords,
        Self::HarvestRecords,
        Self::Plants,
        Self::Alerts,
    ];

    /// Table and remote collection name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogEntries => "log_entries",
            Self::DiagnosisRecords => "diagnosis_records",
            Self::HarvestRecords => "harvest_records",
            Self::Plants => "plants",
            Self::Alerts => "alerts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown collection: {s}")))
    }
}

/// Identity, ownership, timestamps and sync flags carried by every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(default = "unknown_device", deserialize_with = "nullable::or_unknown_device")]
    pub device_id: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable::or_default")]
    pub updated_at: String,
    /// `false` while local changes are not yet confirmed by the remote store.
    #[serde(default, with = "int_bool")]
    pub synced: bool,
    /// Soft-delete flag. Rows are never removed during normal operation.
    #[serde(default, with = "int_bool")]
    pub deleted: bool,
}

fn unknown_device() -> String {
    UNKNOWN_DEVICE.to_string()
}

impl Envelope {
    /// Envelope for a record created on this device right now.
    pub fn new(device_id: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            id: generate_id(),
            device_id: device_id.into(),
            created_at: now.clone(),
            updated_at: now,
            synced: false,
            deleted: false,
        }
    }

    /// Record a local mutation: refresh `updated_at` and mark dirty.
    pub fn touch(&mut self) {
        self.updated_at = now_timestamp();
        self.synced = false;
    }

    /// Replace absent timestamps with deterministic fallbacks.
    pub fn fill_missing_timestamps(&mut self) {
        if self.created_at.trim().is_empty() {
            self.created_at = EPOCH_TIMESTAMP.to_string();
        }
        if self.updated_at.trim().is_empty() {
            self.updated_at.clone_from(&self.created_at);
        }
        if self.device_id.trim().is_empty() {
            self.device_id = unknown_device();
        }
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.id.clone()),
            SqlValue::Text(self.device_id.clone()),
            SqlValue::Text(self.created_at.clone()),
            SqlValue::Text(self.updated_at.clone()),
            SqlValue::Integer(i64::from(self.synced)),
            SqlValue::Integer(i64::from(self.deleted)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
            synced: row.get::<i64>(4)? != 0,
            deleted: row.get::<i64>(5)? != 0,
        })
    }
}

/// An entity that lives in a local table and a remote collection of the same name.
pub trait SyncRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection (and table) holding this entity.
    const COLLECTION: Collection;

    /// Entity columns following [`ENVELOPE_COLUMNS`], in bind order.
    const FIELDS: &'static [&'static str];

    /// Column that holds a payload needing preparation before push.
    const PAYLOAD_COLUMN: Option<&'static str> = None;

    /// `ORDER BY` clause for user-facing listings.
    const ORDER_BY: &'static str = "created_at DESC";

    fn envelope(&self) -> &Envelope;

    fn envelope_mut(&mut self) -> &mut Envelope;

    /// Values for [`Self::FIELDS`], in the same order.
    fn field_values(&self) -> Result<Vec<SqlValue>>;

    /// Decode entity columns starting at [`FIELD_OFFSET`].
    fn from_row(envelope: Envelope, row: &Row) -> Result<Self>;

    /// Local payload reference that must be transcoded before it can be pushed.
    fn pending_payload(&self) -> Option<&str> {
        None
    }

    /// Replace the pending payload with its transportable form.
    fn set_payload(&mut self, _payload: String) {}

    fn id(&self) -> &str {
        &self.envelope().id
    }

    /// All columns in bind order.
    fn columns() -> Vec<&'static str> {
        ENVELOPE_COLUMNS
            .iter()
            .chain(Self::FIELDS.iter())
            .copied()
            .collect()
    }

    /// All bind values in [`Self::columns`] order.
    fn values(&self) -> Result<Vec<SqlValue>> {
        let mut values = self.envelope().values();
        values.extend(self.field_values()?);
        Ok(values)
    }

    fn decode_row(row: &Row) -> Result<Self> {
        let envelope = Envelope::from_row(row)?;
        Self::from_row(envelope, row)
    }

    /// Encode as a remote document. The document id is the record id.
    fn to_document(&self) -> Result<Document> {
        let serde_json::Value::Object(mut fields) = serde_json::to_value(self)? else {
            return Err(Error::InvalidInput(format!(
                "{} record {} did not encode to an object",
                Self::COLLECTION,
                self.id()
            )));
        };
        fields.remove("id");
        Ok(Document {
            id: self.id().to_string(),
            fields,
        })
    }

    /// Decode a remote document, applying defaults for absent envelope fields.
    fn from_document(document: &Document) -> Result<Self> {
        let mut fields = document.fields.clone();
        fields.insert(
            "id".to_string(),
            serde_json::Value::String(document.id.clone()),
        );
        let mut record: Self = serde_json::from_value(serde_json::Value::Object(fields))?;
        record.envelope_mut().fill_missing_timestamps();
        Ok(record)
    }
}

/// Text bind value for an optional column.
pub fn optional_text(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |text| SqlValue::Text(text.to_string()))
}

/// Serde adapter storing booleans as 0/1 integers.
///
/// Decoding also accepts native booleans, numeric strings and null.
pub mod int_bool {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(IntBoolVisitor)
    }

    struct IntBoolVisitor;

    impl Visitor<'_> for IntBoolVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("0, 1, a boolean or null")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<bool, E> {
            Ok(value != 0.0)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
            match value.trim() {
                "1" | "true" => Ok(true),
                "0" | "false" | "" => Ok(false),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }

        fn visit_none<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }
    }
}

/// Serde adapter storing a string list as JSON text.
///
/// Decoding accepts either the JSON text or a native array.
pub mod json_list {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(value: &Vec<String>, serializer: S) -> Result<S::Ok, S::Error> {
        let text = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            List(Vec<String>),
            Null,
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) if text.trim().is_empty() => Ok(Vec::new()),
            Raw::Text(text) => serde_json::from_str(&text).map_err(D::Error::custom),
            Raw::List(list) => Ok(list),
            Raw::Null => Ok(Vec::new()),
        }
    }

    /// Decode the JSON text column form.
    pub fn parse(text: &str) -> crate::Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(text)?)
    }
}

/// Deserializers mapping JSON null to a default.
pub mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn or_unknown_device<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .unwrap_or_else(|| super::UNKNOWN_DEVICE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Flags {
        #[serde(default, with = "int_bool")]
        flag: bool,
    }

    #[test]
    fn int_bool_encodes_integers() {
        let encoded = serde_json::to_value(Flags { flag: true }).unwrap();
        assert_eq!(encoded, json!({ "flag": 1 }));
    }

    #[test]
    fn int_bool_accepts_loose_inputs() {
        for (raw, expected) in [
            (json!({ "flag": 1 }), true),
            (json!({ "flag": 0 }), false),
            (json!({ "flag": true }), true),
            (json!({ "flag": null }), false),
            (json!({ "flag": "1" }), true),
            (json!({}), false),
        ] {
            let decoded: Flags = serde_json::from_value(raw.clone()).unwrap();
            assert_eq!(decoded.flag, expected, "input {raw}");
        }
    }

    #[test]
    fn envelope_defaults_are_deterministic() {
        let mut envelope: Envelope = serde_json::from_value(json!({ "id": "a" })).unwrap();
        envelope.fill_missing_timestamps();

        assert_eq!(envelope.device_id, UNKNOWN_DEVICE);
        assert_eq!(envelope.created_at, EPOCH_TIMESTAMP);
        assert_eq!(envelope.updated_at, EPOCH_TIMESTAMP);
        assert!(!envelope.synced);
        assert!(!envelope.deleted);
    }

    #[test]
    fn envelope_touch_marks_dirty() {
        let mut envelope = Envelope::new("device-1");
        envelope.synced = true;
        envelope.updated_at = EPOCH_TIMESTAMP.to_string();

        envelope.touch();

        assert!(!envelope.synced);
        assert_ne!(envelope.updated_at, EPOCH_TIMESTAMP);
    }

    #[test]
    fn collection_round_trips_through_name() {
        for collection in Collection::ALL {
            assert_eq!(
                collection.as_str().parse::<Collection>().unwrap(),
                collection
            );
        }
        assert!("crops".parse::<Collection>().is_err());
    }
}
