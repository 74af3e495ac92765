//! dbconnect - a thin data-access layer over `mysql_async`
//!
//! Commands are built fluently, parameters are bound by name from explicit
//! lists or from `#[derive(ToParams)]` records, and result rows are
//! materialized into scalars or `#[derive(FromRow)]` records through a
//! shared per-type cache.
//!
//! # Features
//!
//! - **Command Builder**: text or stored-procedure commands, sealed to a
//!   connection once bound
//! - **Parameter Binding**: type inference for common values, explicit
//!   types, and output parameters read back after execution
//! - **Cursors**: single-pass async streams (and blocking iterators) that
//!   release their connection when closed or exhausted
//! - **Readers**: step through every result of a multi-select procedure
//! - **Bulk Loading**: batched multi-row inserts from any record source
//! - **Transactions**: begin, commit, rollback and savepoints, with
//!   commands joining the active transaction automatically
//!
//! # Example
//!
//! ```ignore
//! use dbconnect::{DbConnect, DbParams, FromRow};
//!
//! #[derive(Debug, Default, FromRow)]
//! pub struct User {
//!     pub id: i64,
//!     pub name: String,
//!     pub email: Option<String>,
//! }
//!
//! async fn find_user(db: &DbConnect<dbconnect::MySqlConnector>, id: i64) -> dbconnect::Result<Option<User>> {
//!     let statement = db
//!         .command("get_user")
//!         .params(DbParams::new().add("id", id))
//!         .build()?;
//!     db.first(statement).await
//! }
//! ```

// Lets the derive macros' `dbconnect::` paths resolve inside this crate
extern crate self as dbconnect;

pub mod binder;
pub mod blocking;
pub mod bulk;
pub mod command;
pub mod config;
pub mod connection;
pub mod enumerator;
pub mod error;
pub mod materialize;
pub mod mysql;
pub mod reader;
pub mod traits;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

// Re-export the derive macros
pub use dbconnect_derive::{FromRow, ToParams};

// Re-export main types
pub use binder::{BoundParam, DbParams, DbType, Direction, Param, ParamSet, Size};
pub use bulk::{BulkBatch, BulkCopy, ColumnMapping};
pub use command::{BoundCommand, Command, CommandKind, Sealed, Statement, Unsealed};
pub use config::Settings;
pub use connection::{DbConnect, DbConnection};
pub use enumerator::AsyncEnumerator;
pub use error::{DatabaseError, Error, Result};
pub use materialize::{Materializer, RowPlan, TypeCache, TypeDescriptor};
pub use mysql::{MySqlConnection, MySqlConnector, MySqlConnectorBuilder};
pub use reader::DbReader;
pub use traits::{
    AssignFn, Column, Connection, Connector, ExecuteResult, FieldMapping, FromRow, FromValue,
    IsolationLevel, RawCursor, RecordMapping, Row, RowMapping, ToParams, ToValue,
};
pub use transaction::{TransactionId, TransactionManager, TransactionState};
pub use value::Value;
