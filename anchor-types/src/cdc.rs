//! CDC entities shared by every driver (native and polling-diff): the
//! event model and the portable value representation used to normalize
//! backend-native types at the CDC boundary (§3, §9 "Value normalization").

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A backend-native value normalized to a portable shape: UUID/Decimal/
/// Timestamp/Binary all project to a representation stable across
/// backends so a CDC handler sees a uniform shape (§9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PortableValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Decimal values travel as their canonical string form, never as a
    /// float, to avoid precision loss.
    Decimal(Decimal),
    String(String),
    /// RFC3339 string is the wire form; this variant keeps the parsed
    /// value for deep-equality comparisons in the polling-diff driver.
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl PortableValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PortableValue::Null => "null",
            PortableValue::Bool(_) => "bool",
            PortableValue::Int(_) => "int",
            PortableValue::UInt(_) => "uint",
            PortableValue::Float(_) => "float",
            PortableValue::Decimal(_) => "decimal",
            PortableValue::String(_) => "string",
            PortableValue::Timestamp(_) => "timestamp",
            PortableValue::Date(_) => "date",
            PortableValue::Bytes(_) => "bytes",
            PortableValue::Json(_) => "json",
        }
    }

    /// The string form used to build a polling-diff row key from primary
    /// key column values (§4.5.2).
    pub fn key_fragment(&self) -> String {
        match self {
            PortableValue::Null => String::new(),
            PortableValue::Bool(b) => b.to_string(),
            PortableValue::Int(i) => i.to_string(),
            PortableValue::UInt(u) => u.to_string(),
            PortableValue::Float(f) => f.to_string(),
            PortableValue::Decimal(d) => d.to_string(),
            PortableValue::String(s) => s.clone(),
            PortableValue::Timestamp(t) => t.to_rfc3339(),
            PortableValue::Date(d) => d.to_string(),
            PortableValue::Bytes(b) => hex_encode(b),
            PortableValue::Json(j) => j.to_string(),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A single row, column name -> portable value. Column order follows the
/// owning table's discovered column order (`IndexMap` preserves insertion
/// order).
pub type Row = IndexMap<String, PortableValue>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CdcOperation {
    Insert,
    Update,
    Delete,
    Truncate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CdcEvent {
    pub timestamp: DateTime<Utc>,
    pub schema_name: String,
    pub table_name: String,
    pub operation: CdcOperation,
    /// Post-image; `None` for `Delete`/`Truncate`.
    pub data: Option<Row>,
    /// Pre-image; `None` for `Insert`.
    pub old_data: Option<Row>,
    /// Opaque monotonic-per-source position string. Empty for polling-diff
    /// sources, which have no resumable position (§4.5).
    pub lsn: String,
    pub metadata: BTreeMap<String, String>,
}

impl CdcEvent {
    pub fn insert(schema_name: impl Into<String>, table_name: impl Into<String>, data: Row, timestamp: DateTime<Utc>) -> Self {
        CdcEvent {
            timestamp,
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            operation: CdcOperation::Insert,
            data: Some(data),
            old_data: None,
            lsn: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn update(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        old: Row,
        new: Row,
        timestamp: DateTime<Utc>,
    ) -> Self {
        CdcEvent {
            timestamp,
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            operation: CdcOperation::Update,
            data: Some(new),
            old_data: Some(old),
            lsn: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn delete(schema_name: impl Into<String>, table_name: impl Into<String>, old: Row, timestamp: DateTime<Utc>) -> Self {
        CdcEvent {
            timestamp,
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            operation: CdcOperation::Delete,
            data: None,
            old_data: Some(old),
            lsn: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_lsn(mut self, lsn: impl Into<String>) -> Self {
        self.lsn = lsn.into();
        self
    }
}

/// Metadata field names that `apply_cdc_event` must never treat as data
/// columns (§4.6).
pub const RESERVED_METADATA_FIELDS: &[&str] = &[
    "message_type",
    "raw_data_b64",
    "data_length",
    "database_id",
    "timestamp",
    "schema_name",
    "keyspace",
    "operation",
    "table_name",
];
