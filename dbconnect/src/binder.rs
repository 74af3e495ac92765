//! Parameter binding: type inference, parameter lists and bound parameter sets

use std::fmt;

use crate::error::{Error, Result};
use crate::traits::{ToParams, ToValue};
use crate::value::Value;

/// Database parameter type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    BigInt,
    Int,
    SmallInt,
    TinyInt,
    Bit,
    Float,
    Real,
    Decimal,
    /// Fixed-width text
    NChar,
    /// Variable-width text
    NVarChar,
    Char,
    VarChar,
    Text,
    Binary,
    VarBinary,
    Date,
    Time,
    DateTime,
    UniqueIdentifier,
    Json,
}

impl DbType {
    /// Whether values of this type have a variable length, i.e. an output
    /// parameter of this type takes a size.
    pub fn is_variable_length(self) -> bool {
        matches!(
            self,
            DbType::NChar
                | DbType::NVarChar
                | DbType::Char
                | DbType::VarChar
                | DbType::Text
                | DbType::Binary
                | DbType::VarBinary
        )
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Infer the parameter type of a value.
///
/// The mapping is a closed set: anything outside it (null, unsigned wider
/// than a byte, bytes, json, uuid, dates without time, ...) must be bound
/// with an explicit type.
pub fn infer_type(value: &Value) -> Result<DbType> {
    match value {
        Value::I64(_) => Ok(DbType::BigInt),
        Value::Bool(_) => Ok(DbType::Bit),
        Value::Char(_) => Ok(DbType::NChar),
        Value::String(_) => Ok(DbType::NVarChar),
        Value::DateTime(_) => Ok(DbType::DateTime),
        Value::F64(_) => Ok(DbType::Float),
        Value::Decimal(_) => Ok(DbType::Decimal),
        Value::I16(_) => Ok(DbType::SmallInt),
        Value::I32(_) => Ok(DbType::Int),
        Value::U8(_) => Ok(DbType::TinyInt),
        other => Err(Error::UnsupportedParameterType {
            name: String::new(),
            type_name: other.type_name(),
        }),
    }
}

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Input,
    Output,
}

/// Capacity of a variable-length output parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Bounded(u32),
    Unbounded,
}

/// A parameter as supplied by the caller, before binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Value,
    pub db_type: Option<DbType>,
    pub direction: Direction,
    pub size: Option<u32>,
}

impl Param {
    pub fn input(name: impl Into<String>, value: impl ToValue) -> Self {
        Self {
            name: name.into(),
            value: value.to_value(),
            db_type: None,
            direction: Direction::Input,
            size: None,
        }
    }

    pub fn typed(name: impl Into<String>, value: impl ToValue, db_type: DbType) -> Self {
        Self {
            db_type: Some(db_type),
            ..Self::input(name, value)
        }
    }

    pub fn output(name: impl Into<String>, db_type: DbType, size: Option<u32>) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            db_type: Some(db_type),
            direction: Direction::Output,
            size,
        }
    }
}

/// An explicit parameter list.
///
/// ```ignore
/// let params = DbParams::new()
///     .add("id", 42)
///     .add_typed("nickname", None::<String>, DbType::NVarChar)
///     .add_output("total", DbType::Int, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbParams {
    params: Vec<Param>,
}

impl DbParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input parameter whose type is inferred from the value.
    pub fn add(self, name: impl Into<String>, value: impl ToValue) -> Self {
        self.push(Param::input(name, value))
    }

    /// Add an input parameter with an explicit type. Required for nulls.
    pub fn add_typed(self, name: impl Into<String>, value: impl ToValue, db_type: DbType) -> Self {
        self.push(Param::typed(name, value, db_type))
    }

    /// Add an output parameter.
    pub fn add_output(self, name: impl Into<String>, db_type: DbType, size: Option<u32>) -> Self {
        self.push(Param::output(name, db_type, size))
    }

    pub fn push(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A fully bound parameter: its database type is always known.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    name: String,
    value: Value,
    db_type: DbType,
    direction: Direction,
    size: Option<Size>,
}

impl BoundParam {
    /// Name without any `@` or `:` prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Capacity of an output parameter; `None` for inputs.
    pub fn size(&self) -> Option<Size> {
        self.size
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }
}

/// Strip the provider prefix so `@id`, `:id` and `id` name the same parameter.
pub fn normalize_name(name: &str) -> &str {
    name.trim_start_matches(['@', ':'])
}

/// The bound parameters of one statement.
///
/// Names are unique (case-insensitive); binding is by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    params: Vec<BoundParam>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one parameter.
    ///
    /// Without an explicit type the type is inferred from the value; a null
    /// value or an output parameter without a type is a binding error. A
    /// name may be bound at most once.
    pub fn bind(
        &mut self,
        name: &str,
        value: Value,
        explicit_type: Option<DbType>,
        direction: Direction,
        size: Option<u32>,
    ) -> Result<()> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(Error::Binding("parameter name is empty".to_string()));
        }
        if self.get(name).is_some() {
            return Err(Error::Binding(format!("parameter `{}` is bound twice", name)));
        }

        let db_type = match (explicit_type, direction) {
            (Some(db_type), _) => db_type,
            (None, Direction::Output) => {
                return Err(Error::Binding(format!(
                    "output parameter `{}` requires a declared type",
                    name
                )))
            }
            (None, Direction::Input) if value.is_null() => {
                return Err(Error::Binding(format!(
                    "type of `{}` cannot be inferred from a null value; declare its type",
                    name
                )))
            }
            (None, Direction::Input) => infer_type(&value).map_err(|e| match e {
                Error::UnsupportedParameterType { type_name, .. } => {
                    Error::UnsupportedParameterType {
                        name: name.to_string(),
                        type_name,
                    }
                }
                other => other,
            })?,
        };

        let size = match direction {
            Direction::Output => Some(size.map_or(Size::Unbounded, Size::Bounded)),
            Direction::Input => None,
        };

        self.params.push(BoundParam {
            name: name.to_string(),
            value,
            db_type,
            direction,
            size,
        });
        Ok(())
    }

    /// Bind an explicit parameter list. Fails without side effects.
    pub fn from_params(params: &DbParams) -> Result<Self> {
        let mut set = Self::new();
        for p in params.iter() {
            set.bind(&p.name, p.value.clone(), p.db_type, p.direction, p.size)?;
        }
        Ok(set)
    }

    /// Auto-bind every field of a parameter object by name, inferring types.
    /// Fails without side effects.
    pub fn from_object<P: ToParams + ?Sized>(object: &P) -> Result<Self> {
        Self::from_named_values(P::param_names(), object.param_values())
    }

    pub(crate) fn from_named_values(names: &[&str], values: Vec<Value>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(Error::Binding(format!(
                "{} field names but {} values",
                names.len(),
                values.len()
            )));
        }
        let mut set = Self::new();
        for (name, value) in names.iter().zip(values) {
            set.bind(name, value, None, Direction::Input, None)?;
        }
        Ok(set)
    }

    /// Look up a parameter by name (case-insensitive, prefix ignored).
    pub fn get(&self, name: &str) -> Option<&BoundParam> {
        let name = normalize_name(name);
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParam> {
        self.params.iter()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &BoundParam> {
        self.params.iter().filter(|p| !p.is_output())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &BoundParam> {
        self.params.iter().filter(|p| p.is_output())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
