//! FromValue trait for converting database values to Rust types

use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::value::Value;

/// Trait for types that can be constructed from a database value.
///
/// This is the provider-side coercion used when a column is assigned to a
/// field and when a scalar query reads its first column. It is implemented
/// for common Rust types and can be implemented for custom types (e.g. enums).
pub trait FromValue: Sized {
    /// Convert a database value to this type.
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::TypeConversion {
        expected,
        actual: value.type_name().to_string(),
    }
}

fn narrow<S, D>(expected: &'static str, v: S) -> Result<D>
where
    S: Copy + Display,
    D: TryFrom<S>,
{
    D::try_from(v).map_err(|_| Error::TypeConversion {
        expected,
        actual: format!("{} out of range", v),
    })
}

macro_rules! impl_integer_from_value {
    ($($ty:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    let expected = stringify!($ty);
                    match value {
                        Value::I8(v) => narrow(expected, v),
                        Value::I16(v) => narrow(expected, v),
                        Value::I32(v) => narrow(expected, v),
                        Value::I64(v) => narrow(expected, v),
                        Value::U8(v) => narrow(expected, v),
                        Value::U16(v) => narrow(expected, v),
                        Value::U32(v) => narrow(expected, v),
                        Value::U64(v) => narrow(expected, v),
                        Value::Bool(v) => Ok(v as $ty),
                        other => Err(mismatch(expected, &other)),
                    }
                }
            }
        )*
    };
}

impl_integer_from_value!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::I8(v) => Ok(v != 0),
            Value::I16(v) => Ok(v != 0),
            Value::I32(v) => Ok(v != 0),
            Value::I64(v) => Ok(v != 0),
            Value::U8(v) => Ok(v != 0),
            Value::U16(v) => Ok(v != 0),
            Value::U32(v) => Ok(v != 0),
            Value::U64(v) => Ok(v != 0),
            // BIT(1) columns arrive as a single byte
            Value::Bytes(ref v) if v.len() == 1 => Ok(v[0] != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::F32(v) => Ok(v),
            Value::F64(v) => Ok(v as f32),
            other => Err(mismatch("f32", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::F32(v) => Ok(v.into()),
            Value::F64(v) => Ok(v),
            Value::Decimal(v) => v.to_f64().ok_or_else(|| Error::TypeConversion {
                expected: "f64",
                actual: format!("decimal {} out of range", v),
            }),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(v) => Ok(v),
            Value::I64(v) => Ok(Decimal::from(v)),
            Value::U64(v) => Ok(Decimal::from(v)),
            Value::I32(v) => Ok(Decimal::from(v)),
            Value::String(v) => v.parse().map_err(|_| Error::TypeConversion {
                expected: "decimal",
                actual: format!("invalid decimal string: {}", v),
            }),
            other => Err(mismatch("decimal", &other)),
        }
    }
}

/// Text targets.
///
/// A unique identifier column is not implicitly text on the provider side,
/// so it is stringified explicitly here (hyphenated, lowercase).
impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(v) => Ok(v),
            Value::Char(v) => Ok(v.to_string()),
            Value::Uuid(v) => Ok(v.hyphenated().to_string()),
            Value::Bytes(v) => String::from_utf8(v).map_err(|e| Error::TypeConversion {
                expected: "utf8 string",
                actual: format!("invalid utf8: {}", e),
            }),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromValue for char {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Char(v) => Ok(v),
            Value::String(ref v) => {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(Error::TypeConversion {
                        expected: "char",
                        actual: format!("string of length {}", v.chars().count()),
                    }),
                }
            }
            other => Err(mismatch("char", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::String(v) => Ok(v.into_bytes()),
            Value::Uuid(v) => Ok(v.as_bytes().to_vec()),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(v) => Ok(v),
            Value::String(v) => Uuid::parse_str(&v).map_err(|e| Error::TypeConversion {
                expected: "uuid",
                actual: format!("invalid uuid string: {}", e),
            }),
            Value::Bytes(v) => Uuid::from_slice(&v).map_err(|e| Error::TypeConversion {
                expected: "uuid",
                actual: format!("invalid uuid bytes: {}", e),
            }),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(v) => Ok(v),
            Value::DateTime(v) => Ok(v.date()),
            other => Err(mismatch("date", &other)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::Date(v) => v.and_hms_opt(0, 0, 0).ok_or_else(|| Error::TypeConversion {
                expected: "datetime",
                actual: format!("date {}", v),
            }),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(v) => Ok(v),
            Value::DateTime(v) => Ok(v.time()),
            other => Err(mismatch("time", &other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v),
            Value::String(v) => serde_json::from_str(&v).map_err(|e| Error::TypeConversion {
                expected: "json",
                actual: format!("invalid json: {}", e),
            }),
            other => Err(mismatch("json", &other)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            _ => Ok(Some(T::from_value(value)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening_and_narrowing() {
        assert_eq!(i64::from_value(Value::I32(7)).unwrap(), 7);
        assert_eq!(i16::from_value(Value::I64(-3)).unwrap(), -3);
        assert!(matches!(
            u8::from_value(Value::I64(300)),
            Err(Error::TypeConversion { expected: "u8", .. })
        ));
        assert!(i32::from_value(Value::String("1".into())).is_err());
    }

    #[test]
    fn test_uuid_is_stringified_for_text_targets() {
        let id = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap();
        assert_eq!(
            String::from_value(Value::Uuid(id)).unwrap(),
            "6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
    }

    #[test]
    fn test_null_requires_option() {
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert!(i32::from_value(Value::Null).is_err());
    }

    #[test]
    fn test_char_from_single_character_string() {
        assert_eq!(char::from_value(Value::String("Y".into())).unwrap(), 'Y');
        assert!(char::from_value(Value::String("YES".into())).is_err());
    }
}
