//! `PortableValue` <-> `scylla::CqlValue` conversions (§9 "Value
//! normalization"): UUID/Decimal/Timestamp/Binary all project to the
//! same portable shapes Postgres does, so a CDC handler sees one uniform
//! row regardless of backend.

use anchor_types::PortableValue;
use scylla::frame::response::result::CqlValue;
use scylla::frame::value::CqlTimestamp;

pub fn cql_to_portable(value: Option<&CqlValue>) -> PortableValue {
    let Some(value) = value else { return PortableValue::Null };
    match value {
        CqlValue::Boolean(v) => PortableValue::Bool(*v),
        CqlValue::TinyInt(v) => PortableValue::Int(*v as i64),
        CqlValue::SmallInt(v) => PortableValue::Int(*v as i64),
        CqlValue::Int(v) => PortableValue::Int(*v as i64),
        CqlValue::BigInt(v) => PortableValue::Int(*v),
        CqlValue::Counter(v) => PortableValue::Int(v.0),
        CqlValue::Float(v) => PortableValue::Float(*v as f64),
        CqlValue::Double(v) => PortableValue::Float(*v),
        CqlValue::Decimal(v) => PortableValue::String(v.to_string()),
        CqlValue::Varint(v) => PortableValue::String(v.to_string()),
        CqlValue::Text(v) | CqlValue::Ascii(v) => PortableValue::String(v.clone()),
        CqlValue::Blob(v) => PortableValue::Bytes(v.clone()),
        CqlValue::Uuid(v) | CqlValue::Timeuuid(v) => PortableValue::String(v.to_string()),
        CqlValue::Timestamp(CqlTimestamp(millis)) => chrono::DateTime::from_timestamp_millis(*millis)
            .map(PortableValue::Timestamp)
            .unwrap_or(PortableValue::Null),
        CqlValue::Date(_) => PortableValue::String(format!("{value:?}")),
        CqlValue::Empty => PortableValue::Null,
        other => PortableValue::String(format!("{other:?}")),
    }
}

/// The reverse direction, used by `apply_cdc_event` when writing portable
/// rows back through CQL parameter binding.
pub fn portable_to_cql(value: &PortableValue) -> CqlValue {
    match value {
        PortableValue::Null => CqlValue::Empty,
        PortableValue::Bool(v) => CqlValue::Boolean(*v),
        PortableValue::Int(v) => CqlValue::BigInt(*v),
        PortableValue::UInt(v) => CqlValue::BigInt(*v as i64),
        PortableValue::Float(v) => CqlValue::Double(*v),
        PortableValue::Decimal(v) => CqlValue::Text(v.to_string()),
        PortableValue::String(v) => CqlValue::Text(v.clone()),
        PortableValue::Timestamp(v) => CqlValue::Timestamp(CqlTimestamp(v.timestamp_millis())),
        PortableValue::Date(v) => CqlValue::Text(v.to_string()),
        PortableValue::Bytes(v) => CqlValue::Blob(v.clone()),
        PortableValue::Json(v) => CqlValue::Text(v.to_string()),
    }
}
