//! Row materialization and the type descriptor cache

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::trace;

use crate::error::{Error, Result};
use crate::traits::{Column, FromRow, RecordMapping, Row, RowMapping};

/// The compiled mapping of one target type.
///
/// Built once per type from [`FromRow::mapping`]; for records this adds a
/// case-insensitive name index over the field table.
pub struct TypeDescriptor<T> {
    mapping: RowMapping<T>,
    index: HashMap<String, usize>,
}

impl<T: FromRow> TypeDescriptor<T> {
    fn build() -> Self {
        let mapping = T::mapping();
        let mut index = HashMap::new();
        if let RowMapping::Record(record) = &mapping {
            for (i, field) in record.fields().iter().enumerate() {
                index.entry(field.name().to_lowercase()).or_insert(i);
            }
        }
        Self { mapping, index }
    }
}

impl<T> TypeDescriptor<T> {
    pub fn mapping(&self) -> &RowMapping<T> {
        &self.mapping
    }

    /// Field position for a column name, ignoring case.
    pub fn field_index(&self, column: &str) -> Option<usize> {
        self.index.get(&column.to_lowercase()).copied()
    }
}

/// Cache of [`TypeDescriptor`]s keyed by target type.
///
/// Entries are populated on first use and never invalidated. Readers never
/// block each other; when two callers race to populate the same type, the
/// first insert wins and the other's descriptor is discarded.
#[derive(Default)]
pub struct TypeCache {
    entries: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache, used when none is injected.
    pub fn shared() -> Arc<TypeCache> {
        static SHARED: OnceLock<Arc<TypeCache>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(TypeCache::new())).clone()
    }

    /// Get the descriptor of `T`, building it on first use.
    pub fn descriptor<T: FromRow>(&self) -> Arc<TypeDescriptor<T>> {
        let key = TypeId::of::<T>();
        let cached = self.entries.get(&key).map(|entry| entry.value().clone());
        if let Some(Ok(descriptor)) = cached.map(|c| c.downcast::<TypeDescriptor<T>>()) {
            return descriptor;
        }

        let built = Arc::new(TypeDescriptor::<T>::build());
        trace!(type_name = std::any::type_name::<T>(), "caching row mapping");
        let winner = self
            .entries
            .entry(key)
            .or_insert_with(|| built.clone() as Arc<dyn Any + Send + Sync>)
            .value()
            .clone();
        winner.downcast::<TypeDescriptor<T>>().unwrap_or(built)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Column-to-field assignment plan for one result.
///
/// Computed once per result from its columns, then applied to every row.
pub struct RowPlan<T> {
    descriptor: Arc<TypeDescriptor<T>>,
    slots: Vec<Option<usize>>,
}

impl<T> RowPlan<T> {
    /// Materialize one row.
    pub fn apply(&self, row: Row) -> Result<T> {
        match &self.descriptor.mapping {
            RowMapping::Scalar(convert) => {
                let first = row
                    .into_values()
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::ColumnNotFound("#0".to_string()))?;
                convert(first)
            }
            RowMapping::Record(record) => self.assign(record, row),
            RowMapping::Row(convert) => convert(row),
        }
    }

    fn assign(&self, record: &RecordMapping<T>, row: Row) -> Result<T> {
        let mut target = record.construct();
        for (value, slot) in row.into_values().into_iter().zip(&self.slots) {
            let Some(field) = slot.and_then(|i| record.fields().get(i)) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            field.assign(&mut target, value)?;
        }
        Ok(target)
    }

    /// Number of columns that map onto a field.
    pub fn matched(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Turns rows into values of a target type.
///
/// Cloning is cheap; clones share the same [`TypeCache`].
#[derive(Clone)]
pub struct Materializer {
    cache: Arc<TypeCache>,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(TypeCache::shared())
    }
}

impl Materializer {
    pub fn new(cache: Arc<TypeCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<TypeCache> {
        &self.cache
    }

    /// Plan the materialization of `T` for a result with these columns.
    pub fn plan<T: FromRow>(&self, columns: &[Column]) -> RowPlan<T> {
        let descriptor = self.cache.descriptor::<T>();
        let slots = match &descriptor.mapping {
            RowMapping::Record(_) => columns
                .iter()
                .map(|c| descriptor.field_index(c.name()))
                .collect(),
            _ => Vec::new(),
        };
        RowPlan { descriptor, slots }
    }

    /// Materialize a single row.
    ///
    /// Scalar targets take the first column. Records start from their default
    /// value and receive every non-null column whose name matches a field,
    /// ignoring case; other columns are skipped.
    pub fn materialize<T: FromRow>(&self, row: Row) -> Result<T> {
        self.plan::<T>(row.columns()).apply(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{FieldMapping, FromValue};
    use crate::value::Value;

    #[derive(Debug, Default, PartialEq)]
    struct User {
        id: i32,
        name: String,
        nickname: Option<String>,
        score: i64,
    }

    impl FromRow for User {
        fn mapping() -> RowMapping<Self> {
            RowMapping::Record(RecordMapping::new(
                "User",
                User::default,
                vec![
                    FieldMapping::new("Id", |u: &mut User, v| {
                        u.id = FromValue::from_value(v)?;
                        Ok(())
                    }),
                    FieldMapping::new("Name", |u: &mut User, v| {
                        u.name = FromValue::from_value(v)?;
                        Ok(())
                    }),
                    FieldMapping::new("nickname", |u: &mut User, v| {
                        u.nickname = FromValue::from_value(v)?;
                        Ok(())
                    }),
                    FieldMapping::new("score", |u: &mut User, v| {
                        u.score = FromValue::from_value(v)?;
                        Ok(())
                    }),
                ],
            ))
        }
    }

    fn row(columns: &[&str], values: Vec<Value>) -> Row {
        let columns: Arc<[Column]> = columns.iter().map(|c| Column::new(*c)).collect();
        Row::new(columns, values).unwrap()
    }

    #[test]
    fn test_record_assigns_matching_non_null_columns() {
        let materializer = Materializer::new(Arc::new(TypeCache::new()));
        let user: User = materializer
            .materialize(row(
                &["ID", "name", "unknown", "score"],
                vec![
                    Value::I64(42),
                    Value::String("ada".into()),
                    Value::String("ignored".into()),
                    Value::Null,
                ],
            ))
            .unwrap();
        assert_eq!(
            user,
            User {
                id: 42,
                name: "ada".into(),
                nickname: None,
                score: 0,
            }
        );
    }

    #[test]
    fn test_plan_matches_by_name() {
        let materializer = Materializer::new(Arc::new(TypeCache::new()));
        let columns = [Column::new("NAME"), Column::new("other"), Column::new("id")];
        assert_eq!(materializer.plan::<User>(&columns).matched(), 2);
    }

    #[test]
    fn test_scalar_takes_first_column() {
        let materializer = Materializer::new(Arc::new(TypeCache::new()));
        let n: i64 = materializer
            .materialize(row(&["count", "x"], vec![Value::I32(3), Value::Null]))
            .unwrap();
        assert_eq!(n, 3);

        let none: Option<String> = materializer
            .materialize(row(&["nick"], vec![Value::Null]))
            .unwrap();
        assert_eq!(none, None);

        let empty = materializer.materialize::<i64>(row(&[], vec![]));
        assert!(matches!(empty, Err(Error::ColumnNotFound(c)) if c == "#0"));
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        let materializer = Materializer::new(Arc::new(TypeCache::new()));
        let result = materializer.materialize::<User>(row(&["id"], vec![Value::String("x".into())]));
        assert!(matches!(result, Err(Error::TypeConversion { .. })));
    }

    #[test]
    fn test_cache_is_populated_once() {
        let cache = TypeCache::new();
        assert!(!cache.contains::<User>());
        let first = cache.descriptor::<User>();
        let second = cache.descriptor::<User>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.field_index("NICKNAME"), Some(2));
    }

    #[test]
    fn test_concurrent_population() {
        let cache = Arc::new(TypeCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.descriptor::<User>())
            })
            .collect();
        let descriptors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        let winner = cache.descriptor::<User>();
        assert!(descriptors.iter().all(|d| Arc::ptr_eq(d, &winner)));
    }
}
