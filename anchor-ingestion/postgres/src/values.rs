//! `PortableValue` <-> `tokio_postgres` conversions. Grounded on the
//! teacher's consistent choice of `with-chrono-0_4`/`with-uuid-1` feature
//! flags on `tokio-postgres`/`postgres-types` rather than hand-rolled
//! wire-format parsing.

use anchor_types::{AnchorError, AnchorResult, BackendId, PortableValue};
use bytes::BytesMut;
use postgres_types::{IsNull, ToSql, Type};
use rust_decimal::Decimal;

/// Reads one column out of a `tokio_postgres::Row` by backend type name,
/// falling back to the text representation for anything this build does
/// not special-case.
pub fn column_to_portable(row: &tokio_postgres::Row, index: usize) -> AnchorResult<PortableValue> {
    let column = &row.columns()[index];
    let type_name = column.type_().name();
    let value = match type_name {
        "bool" => row
            .try_get::<_, Option<bool>>(index)
            .map(|v| v.map(PortableValue::Bool).unwrap_or(PortableValue::Null)),
        "int2" => row
            .try_get::<_, Option<i16>>(index)
            .map(|v| v.map(|v| PortableValue::Int(v as i64)).unwrap_or(PortableValue::Null)),
        "int4" => row
            .try_get::<_, Option<i32>>(index)
            .map(|v| v.map(|v| PortableValue::Int(v as i64)).unwrap_or(PortableValue::Null)),
        "int8" => row
            .try_get::<_, Option<i64>>(index)
            .map(|v| v.map(PortableValue::Int).unwrap_or(PortableValue::Null)),
        "float4" => row
            .try_get::<_, Option<f32>>(index)
            .map(|v| v.map(|v| PortableValue::Float(v as f64)).unwrap_or(PortableValue::Null)),
        "float8" => row
            .try_get::<_, Option<f64>>(index)
            .map(|v| v.map(PortableValue::Float).unwrap_or(PortableValue::Null)),
        "numeric" => row
            .try_get::<_, Option<Decimal>>(index)
            .map(|v| v.map(PortableValue::Decimal).unwrap_or(PortableValue::Null)),
        "timestamp" | "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(index)
            .map(|v| v.map(PortableValue::Timestamp).unwrap_or(PortableValue::Null)),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(index)
            .map(|v| v.map(PortableValue::Date).unwrap_or(PortableValue::Null)),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(index)
            .map(|v| v.map(PortableValue::Bytes).unwrap_or(PortableValue::Null)),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(index)
            .map(|v| v.map(PortableValue::Json).unwrap_or(PortableValue::Null)),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(index)
            .map(|v| v.map(|u| PortableValue::String(u.to_string())).unwrap_or(PortableValue::Null)),
        _ => row
            .try_get::<_, Option<String>>(index)
            .map(|v| v.map(PortableValue::String).unwrap_or(PortableValue::Null)),
    };
    value.map_err(|err| AnchorError::wrapped(BackendId::Postgres, "decode_column", err).with_context("column", column.name()))
}

/// A `ToSql` wrapper so `PortableValue`s can be passed straight into
/// `tokio_postgres` parameterized queries without the caller matching on
/// the variant at the call site.
pub struct PgParam<'a>(pub &'a PortableValue);

impl<'a> ToSql for PgParam<'a> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            PortableValue::Null => Ok(IsNull::Yes),
            PortableValue::Bool(v) => v.to_sql(ty, out),
            PortableValue::Int(v) => v.to_sql(ty, out),
            PortableValue::UInt(v) => (*v as i64).to_sql(ty, out),
            PortableValue::Float(v) => v.to_sql(ty, out),
            PortableValue::Decimal(v) => v.to_sql(ty, out),
            PortableValue::String(v) => v.to_sql(ty, out),
            PortableValue::Timestamp(v) => v.to_sql(ty, out),
            PortableValue::Date(v) => v.to_sql(ty, out),
            PortableValue::Bytes(v) => v.to_sql(ty, out),
            PortableValue::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Decodes a pgoutput tuple column (text-format bytes, per the logical
/// replication protocol) into a `PortableValue`. pgoutput sends every
/// value as text regardless of the column's wire type.
pub fn decode_pgoutput_text(bytes: &[u8]) -> PortableValue {
    match std::str::from_utf8(bytes) {
        Ok(s) => PortableValue::String(s.to_string()),
        Err(_) => PortableValue::Bytes(bytes.to_vec()),
    }
}
