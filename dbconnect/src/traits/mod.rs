//! Core traits for dbconnect

mod connection;
mod from_row;
mod from_value;
mod to_params;
mod to_value;
mod transaction;

pub use connection::{Connection, Connector, ExecuteResult, RawCursor};
pub use from_row::{AssignFn, Column, FieldMapping, FromRow, RecordMapping, Row, RowMapping};
pub use from_value::FromValue;
pub use to_params::ToParams;
pub use to_value::ToValue;
pub use transaction::IsolationLevel;
