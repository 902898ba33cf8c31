//! `PortableValue` <-> `mysql_async::Value` conversions (§9 "Value
//! normalization"). MySQL's wire protocol already returns typed values
//! (unlike Postgres's pgoutput text tuples), so this is a direct match
//! rather than a parse.

use anchor_types::PortableValue;
use chrono::{Datelike, Timelike};
use mysql_async::Value;

pub fn mysql_to_portable(value: &Value) -> PortableValue {
    match value {
        Value::NULL => PortableValue::Null,
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => PortableValue::String(text.to_string()),
            Err(_) => PortableValue::Bytes(bytes.clone()),
        },
        Value::Int(v) => PortableValue::Int(*v),
        Value::UInt(v) => PortableValue::UInt(*v),
        Value::Float(v) => PortableValue::Float(*v as f64),
        Value::Double(v) => PortableValue::Float(*v),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = chrono::NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32);
            let time = chrono::NaiveTime::from_hms_micro_opt(*hour as u32, *minute as u32, *second as u32, *micros);
            match (date, time) {
                (Some(date), Some(time)) => PortableValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(date.and_time(time), chrono::Utc)),
                (Some(date), None) => PortableValue::Date(date),
                _ => PortableValue::Null,
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            // A MySQL TIME value can exceed 24h; folded into a plain text
            // representation rather than forced through `NaiveTime`, which
            // cannot hold more than one day.
            let sign = if *negative { "-" } else { "" };
            let total_hours = *days as u32 * 24 + *hours as u32;
            PortableValue::String(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"))
        }
    }
}

pub fn portable_to_mysql(value: &PortableValue) -> Value {
    match value {
        PortableValue::Null => Value::NULL,
        PortableValue::Bool(v) => Value::Int(if *v { 1 } else { 0 }),
        PortableValue::Int(v) => Value::Int(*v),
        PortableValue::UInt(v) => Value::UInt(*v),
        PortableValue::Float(v) => Value::Double(*v),
        PortableValue::Decimal(v) => Value::Bytes(v.to_string().into_bytes()),
        PortableValue::String(v) => Value::Bytes(v.clone().into_bytes()),
        PortableValue::Timestamp(v) => {
            let naive = v.naive_utc();
            Value::Date(
                naive.date().year() as u16,
                naive.date().month() as u8,
                naive.date().day() as u8,
                naive.time().hour() as u8,
                naive.time().minute() as u8,
                naive.time().second() as u8,
                naive.time().and_utc().timestamp_subsec_micros(),
            )
        }
        PortableValue::Date(v) => Value::Date(v.year() as u16, v.month() as u8, v.day() as u8, 0, 0, 0, 0),
        PortableValue::Bytes(v) => Value::Bytes(v.clone()),
        PortableValue::Json(v) => Value::Bytes(v.to_string().into_bytes()),
    }
}
