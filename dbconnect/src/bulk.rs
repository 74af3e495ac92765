//! Bulk loading: column mapping and batching

use std::collections::HashSet;
use std::time::Duration;

use crate::config::defaults;
use crate::error::{Error, Result};
use crate::traits::ToParams;
use crate::transaction::TransactionId;
use crate::value::Value;

/// Maps one source field onto the destination column of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    source: &'static str,
    source_index: usize,
    destination: String,
}

impl ColumnMapping {
    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

/// Derive column mappings from the field table of `T`, skipping ignored
/// fields (matched without regard to case).
///
/// Destination names must be unique, again ignoring case.
pub fn map_columns<T: ToParams>(ignore: &[String]) -> Result<Vec<ColumnMapping>> {
    let mut seen = HashSet::new();
    let mut mappings = Vec::new();
    for (source_index, &source) in T::param_names().iter().enumerate() {
        if ignore.iter().any(|i| i.eq_ignore_ascii_case(source)) {
            continue;
        }
        if !seen.insert(source.to_lowercase()) {
            return Err(Error::Configuration(format!(
                "duplicate destination column `{}`",
                source
            )));
        }
        mappings.push(ColumnMapping {
            source,
            source_index,
            destination: source.to_string(),
        });
    }
    Ok(mappings)
}

/// Options of one bulk load.
///
/// ```ignore
/// let copy = BulkCopy::new("users").ignore(["id"]).batch_size(1000);
/// let written = conn.bulk(&copy, users).await?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BulkCopy {
    destination: String,
    batch_size: usize,
    timeout: Duration,
    ignore: Vec<String>,
    transaction: Option<TransactionId>,
}

impl BulkCopy {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            batch_size: defaults::BATCH_SIZE,
            timeout: Duration::from_secs(defaults::COMMAND_TIMEOUT_SECS),
            ignore: Vec::new(),
            transaction: None,
        }
    }

    /// Rows per flushed batch. Zero is treated as one.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Timeout of each batch write.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Source fields that are not copied.
    pub fn ignore<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn get_batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn get_transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub(crate) fn writer<T: ToParams>(&self) -> Result<BatchWriter> {
        let mappings = map_columns::<T>(&self.ignore)?;
        if mappings.is_empty() {
            return Err(Error::Configuration(format!(
                "no columns to copy into `{}`",
                self.destination
            )));
        }
        Ok(BatchWriter {
            table: self.destination.clone(),
            timeout: self.timeout,
            batch_size: self.batch_size,
            mappings,
            pending: Vec::new(),
        })
    }
}

/// One batch of rows handed to the provider's bulk-copy primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkBatch {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub timeout: Duration,
}

/// Accumulates projected rows into batches.
pub(crate) struct BatchWriter {
    table: String,
    timeout: Duration,
    batch_size: usize,
    mappings: Vec<ColumnMapping>,
    pending: Vec<Vec<Value>>,
}

impl BatchWriter {
    /// Add a record; returns a full batch once `batch_size` rows are pending.
    pub(crate) fn push<T: ToParams>(&mut self, record: &T) -> Result<Option<BulkBatch>> {
        let mut values = record.param_values();
        if values.len() != T::param_names().len() {
            return Err(Error::Binding(format!(
                "{} field names but {} values",
                T::param_names().len(),
                values.len()
            )));
        }
        let row = self
            .mappings
            .iter()
            .map(|m| std::mem::replace(&mut values[m.source_index], Value::Null))
            .collect();
        self.pending.push(row);

        if self.pending.len() >= self.batch_size {
            Ok(Some(self.take()))
        } else {
            Ok(None)
        }
    }

    /// The remaining partial batch, if any rows are pending.
    pub(crate) fn finish(&mut self) -> Option<BulkBatch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    fn take(&mut self) -> BulkBatch {
        BulkBatch {
            table: self.table.clone(),
            columns: self.mappings.iter().map(|m| m.destination.clone()).collect(),
            rows: std::mem::take(&mut self.pending),
            timeout: self.timeout,
        }
    }
}
