//! Rows, and the FromRow mapping descriptors that turn them into values

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::traits::FromValue;
use crate::value::Value;

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Column name as reported by the provider.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One fetched row: shared column metadata plus the row's values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. The value count must match the column count.
    pub fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(Error::RowDecode(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a column position.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive).
    pub fn get_value(&self, column: &str) -> Result<Value> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .map(|i| self.values[i].clone())
            .ok_or_else(|| Error::ColumnNotFound(column.to_string()))
    }

    /// Get a typed value by column name (case-insensitive).
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        T::from_value(self.get_value(column)?)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Assigns one column value onto a field of `T`.
pub type AssignFn<T> = fn(&mut T, Value) -> Result<()>;

/// A single field of a record mapping.
pub struct FieldMapping<T> {
    name: &'static str,
    assign: AssignFn<T>,
}

impl<T> FieldMapping<T> {
    pub fn new(name: &'static str, assign: AssignFn<T>) -> Self {
        Self { name, assign }
    }

    /// Column name this field is matched against.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn assign(&self, target: &mut T, value: Value) -> Result<()> {
        (self.assign)(target, value)
    }
}

/// Explicit field table of a record type: how to construct a default
/// instance, and which named fields a column may be assigned to.
pub struct RecordMapping<T> {
    type_name: &'static str,
    construct: fn() -> T,
    fields: Vec<FieldMapping<T>>,
}

impl<T> RecordMapping<T> {
    pub fn new(type_name: &'static str, construct: fn() -> T, fields: Vec<FieldMapping<T>>) -> Self {
        Self {
            type_name,
            construct,
            fields,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldMapping<T>] {
        &self.fields
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(FieldMapping::name).collect()
    }

    pub(crate) fn construct(&self) -> T {
        (self.construct)()
    }
}

/// How rows become a `T`.
pub enum RowMapping<T> {
    /// Take the first column and coerce it.
    Scalar(fn(Value) -> Result<T>),
    /// Assign same-named, non-null columns onto a default instance.
    Record(RecordMapping<T>),
    /// Hand over the whole row.
    Row(fn(Row) -> Result<T>),
}

/// Trait for types that can be materialized from a result row.
///
/// Records implement this with `#[derive(FromRow)]`, which produces a
/// [`RecordMapping`] and requires `Default`. Scalar types (integers, strings,
/// dates, ...) and `Option` of them read the first column only.
///
/// # Manual Implementation
///
/// ```ignore
/// use dbconnect::{FieldMapping, FromRow, FromValue, RecordMapping, RowMapping};
///
/// #[derive(Default)]
/// pub struct User {
///     pub id: i64,
///     pub name: String,
/// }
///
/// impl FromRow for User {
///     fn mapping() -> RowMapping<Self> {
///         RowMapping::Record(RecordMapping::new(
///             "User",
///             User::default,
///             vec![
///                 FieldMapping::new("id", |u: &mut User, v| {
///                     u.id = FromValue::from_value(v)?;
///                     Ok(())
///                 }),
///                 FieldMapping::new("name", |u: &mut User, v| {
///                     u.name = FromValue::from_value(v)?;
///                     Ok(())
///                 }),
///             ],
///         ))
///     }
/// }
/// ```
pub trait FromRow: Sized + Send + 'static {
    /// The mapping descriptor for this type.
    ///
    /// Called once per type; the result is kept in a
    /// [`TypeCache`](crate::TypeCache).
    fn mapping() -> RowMapping<Self>;
}

macro_rules! impl_scalar_from_row {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromRow for $ty {
                fn mapping() -> RowMapping<Self> {
                    RowMapping::Scalar(<$ty as FromValue>::from_value)
                }
            }
        )*
    };
}

impl_scalar_from_row!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    Decimal,
    char,
    String,
    Vec<u8>,
    Uuid,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
    serde_json::Value,
    Value,
);

impl<T: FromValue + Send + 'static> FromRow for Option<T> {
    fn mapping() -> RowMapping<Self> {
        RowMapping::Scalar(<Option<T> as FromValue>::from_value)
    }
}

impl FromRow for Row {
    fn mapping() -> RowMapping<Self> {
        RowMapping::Row(|row| Ok(row))
    }
}
