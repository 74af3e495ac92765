//! The provider seam: connections, raw cursors and connectors

use std::sync::Arc;

use async_trait::async_trait;

use crate::binder::normalize_name;
use crate::bulk::BulkBatch;
use crate::command::Statement;
use crate::error::{Error, Result};
use crate::traits::{Column, FromValue, IsolationLevel};
use crate::value::Value;

/// Result of executing a statement that returns no rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    /// Number of rows affected by the statement
    pub rows_affected: u64,
    /// Last inserted ID (for auto-increment columns)
    pub last_insert_id: Option<u64>,
    /// Values of the statement's output parameters, after execution
    pub outputs: Vec<(String, Value)>,
}

impl ExecuteResult {
    /// Read back an output parameter.
    ///
    /// A parameter the procedure never set reads as SQL NULL: it converts to
    /// `None` for `Option<T>`, and fails with [`Error::UnexpectedNull`] for
    /// any other target type.
    pub fn output<T: FromValue>(&self, name: &str) -> Result<T> {
        let name = normalize_name(name);
        let value = self
            .outputs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::Binding(format!("no output parameter named `{}`", name)))?;

        if value.is_null() {
            return T::from_value(Value::Null).map_err(|_| Error::UnexpectedNull(name.to_string()));
        }
        T::from_value(value)
    }
}

/// A live, forward-only cursor over the results of one statement.
///
/// The cursor borrows its connection; only one can be live per connection.
#[async_trait]
pub trait RawCursor: Send {
    /// Columns of the current result.
    fn columns(&self) -> Arc<[Column]>;

    /// Fetch the next row of the current result, `None` once it is consumed.
    async fn fetch(&mut self) -> Result<Option<Vec<Value>>>;

    /// Advance to the next result, returning whether there is one.
    async fn next_result(&mut self) -> Result<bool>;

    /// Release the cursor, discarding anything not yet read.
    async fn close(&mut self) -> Result<()>;
}

/// A single provider connection.
///
/// This is the narrow driver interface everything else is built on. Callers
/// must serialize use of a connection; `&mut self` enforces that statically.
#[async_trait]
pub trait Connection: Send {
    fn is_open(&self) -> bool;

    async fn open(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Execute a statement, discarding any rows it produces.
    async fn execute(&mut self, statement: &Statement) -> Result<ExecuteResult>;

    /// Execute a statement and open a cursor over its results.
    async fn query<'a>(&'a mut self, statement: &'a Statement)
        -> Result<Box<dyn RawCursor + 'a>>;

    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Create a savepoint in the active transaction.
    async fn save(&mut self, name: &str) -> Result<()>;

    /// Roll the active transaction back to a savepoint.
    async fn rollback_to(&mut self, name: &str) -> Result<()>;

    /// Write one batch through the bulk-copy protocol, returning rows written.
    async fn write_to_server(&mut self, batch: &BulkBatch) -> Result<u64>;
}

/// Opens new provider connections, for calls that own their connection.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection + 'static;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection>;
}
