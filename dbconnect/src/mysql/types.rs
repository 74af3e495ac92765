//! Value conversion between dbconnect and mysql_async

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::{Column as MySqlColumn, Row as MySqlRow, Value as MySqlValue};
use uuid::Uuid;

use crate::binder::{DbType, Size};
use crate::error::{Error, Result};
use crate::traits::FromValue;
use crate::value::Value;

/// Convert a dbconnect value to a mysql_async value
pub fn to_mysql_value(value: &Value) -> MySqlValue {
    match value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(v) => MySqlValue::from(*v),
        Value::I8(v) => MySqlValue::from(*v),
        Value::I16(v) => MySqlValue::from(*v),
        Value::I32(v) => MySqlValue::from(*v),
        Value::I64(v) => MySqlValue::from(*v),
        Value::U8(v) => MySqlValue::from(*v),
        Value::U16(v) => MySqlValue::from(*v),
        Value::U32(v) => MySqlValue::from(*v),
        Value::U64(v) => MySqlValue::from(*v),
        Value::F32(v) => MySqlValue::from(*v),
        Value::F64(v) => MySqlValue::from(*v),
        Value::Char(v) => MySqlValue::from(v.to_string()),
        Value::String(v) => MySqlValue::from(v.as_str()),
        Value::Bytes(v) => MySqlValue::from(v.as_slice()),
        Value::Date(v) => MySqlValue::Date(v.year() as u16, v.month() as u8, v.day() as u8, 0, 0, 0, 0),
        Value::DateTime(v) => MySqlValue::Date(
            v.year() as u16,
            v.month() as u8,
            v.day() as u8,
            v.hour() as u8,
            v.minute() as u8,
            v.second() as u8,
            v.and_utc().timestamp_subsec_micros(),
        ),
        Value::Time(v) => MySqlValue::Time(
            false,
            0,
            v.hour() as u8,
            v.minute() as u8,
            v.second() as u8,
            v.nanosecond() / 1000,
        ),
        Value::Decimal(v) => MySqlValue::from(v.to_string()),
        Value::Uuid(v) => MySqlValue::from(v.hyphenated().to_string()),
        Value::Json(v) => MySqlValue::from(v.to_string()),
    }
}

fn date(year: u16, month: u8, day: u8) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).ok_or_else(|| {
        Error::TypeConversion {
            expected: "date",
            actual: format!("{}-{}-{}", year, month, day),
        }
    })
}

/// Convert a mysql_async value to a dbconnect value
pub fn from_mysql_value(value: MySqlValue) -> Result<Value> {
    match value {
        MySqlValue::NULL => Ok(Value::Null),
        MySqlValue::Bytes(v) => match String::from_utf8(v) {
            Ok(s) => Ok(Value::String(s)),
            Err(e) => Ok(Value::Bytes(e.into_bytes())),
        },
        MySqlValue::Int(v) => Ok(Value::I64(v)),
        MySqlValue::UInt(v) => Ok(Value::U64(v)),
        MySqlValue::Float(v) => Ok(Value::F32(v)),
        MySqlValue::Double(v) => Ok(Value::F64(v)),
        MySqlValue::Date(year, month, day, 0, 0, 0, 0) => Ok(Value::Date(date(year, month, day)?)),
        MySqlValue::Date(year, month, day, hour, min, sec, micro) => {
            let time = NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                .ok_or_else(|| Error::TypeConversion {
                    expected: "time",
                    actual: format!("{}:{}:{}.{}", hour, min, sec, micro),
                })?;
            Ok(Value::DateTime(NaiveDateTime::new(date(year, month, day)?, time)))
        }
        MySqlValue::Time(is_neg, days, hours, mins, secs, micro) => {
            // NaiveTime only covers 00:00:00 to 23:59:59
            if is_neg || days > 0 || hours >= 24 {
                return Err(Error::TypeConversion {
                    expected: "time (00:00:00 to 23:59:59)",
                    actual: format!(
                        "{}{}:{:02}:{:02}",
                        if is_neg { "-" } else { "" },
                        days * 24 + hours as u32,
                        mins,
                        secs
                    ),
                });
            }
            let time = NaiveTime::from_hms_micro_opt(hours as u32, mins as u32, secs as u32, micro)
                .ok_or_else(|| Error::TypeConversion {
                    expected: "time",
                    actual: format!("{}:{}:{}.{}", hours, mins, secs, micro),
                })?;
            Ok(Value::Time(time))
        }
    }
}

/// Collation id of the `binary` character set.
const BINARY_CHARSET: u16 = 63;

/// `BINARY(16)`, the usual column type for a UUID.
fn is_uuid_column(column: &MySqlColumn) -> bool {
    column.column_type() == ColumnType::MYSQL_TYPE_STRING
        && column.character_set() == BINARY_CHARSET
        && column.column_length() == 16
}

/// Convert a fetched value using its column metadata: a 16-byte value of a
/// `BINARY(16)` column is read as a UUID.
pub fn column_value(value: MySqlValue, column: &MySqlColumn) -> Result<Value> {
    match value {
        MySqlValue::Bytes(bytes) if bytes.len() == 16 && is_uuid_column(column) => {
            let bytes: [u8; 16] = bytes.as_slice().try_into().map_err(|_| Error::TypeConversion {
                expected: "uuid",
                actual: format!("{} bytes", bytes.len()),
            })?;
            Ok(Value::Uuid(Uuid::from_bytes(bytes)))
        }
        other => from_mysql_value(other),
    }
}

/// All values of a fetched row, in column order.
pub fn row_values(row: &MySqlRow) -> Result<Vec<Value>> {
    let columns = row.columns_ref();
    (0..row.len())
        .map(|i| {
            let value = row.as_ref(i).cloned().ok_or_else(|| {
                Error::ColumnNotFound(
                    row.columns_ref()
                        .get(i)
                        .map(|c| c.name_str().to_string())
                        .unwrap_or_else(|| format!("#{}", i)),
                )
            })?;
            match columns.get(i) {
                Some(column) => column_value(value, column),
                None => from_mysql_value(value),
            }
        })
        .collect()
}

/// `CAST` target used to read back an output parameter of this type.
pub fn output_cast(db_type: DbType, size: Size) -> String {
    let sized = |name: &str| match size {
        Size::Bounded(n) => format!("{}({})", name, n),
        Size::Unbounded => name.to_string(),
    };
    match db_type {
        DbType::BigInt | DbType::Int | DbType::SmallInt | DbType::TinyInt => "SIGNED".to_string(),
        DbType::Bit => "UNSIGNED".to_string(),
        DbType::Float | DbType::Real => "DOUBLE".to_string(),
        DbType::Decimal => "DECIMAL(38, 10)".to_string(),
        DbType::NChar | DbType::NVarChar | DbType::Char | DbType::VarChar | DbType::Text => {
            sized("CHAR")
        }
        DbType::Binary | DbType::VarBinary => sized("BINARY"),
        DbType::Date => "DATE".to_string(),
        DbType::Time => "TIME".to_string(),
        DbType::DateTime => "DATETIME(6)".to_string(),
        DbType::UniqueIdentifier => "CHAR(36)".to_string(),
        DbType::Json => "JSON".to_string(),
    }
}

/// Shape a read-back output value to its declared type.
pub fn output_value(value: MySqlValue, db_type: DbType) -> Result<Value> {
    let value = from_mysql_value(value)?;
    if value.is_null() {
        return Ok(value);
    }
    Ok(match db_type {
        DbType::Bit => Value::Bool(bool::from_value(value)?),
        DbType::Decimal => Value::Decimal(FromValue::from_value(value)?),
        DbType::UniqueIdentifier => Value::Uuid(Uuid::from_value(value)?),
        DbType::Json => Value::Json(FromValue::from_value(value)?),
        DbType::Binary | DbType::VarBinary => Value::Bytes(FromValue::from_value(value)?),
        DbType::Date => Value::Date(FromValue::from_value(value)?),
        DbType::DateTime => Value::DateTime(FromValue::from_value(value)?),
        _ => value,
    })
}
