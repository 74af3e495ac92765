//! Error types for dbconnect

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for dbconnect operations
pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE raised by `SIGNAL SQLSTATE '45000'` (unhandled user-defined exception).
pub const USER_ERROR_SQLSTATE: &str = "45000";

/// MySQL `ER_SIGNAL_EXCEPTION`, reported for user `SIGNAL` statements.
pub const MYSQL_SIGNAL_ERROR_CODE: u16 = 1644;

/// SQL Server's default `RAISERROR` message number.
pub const SQLSERVER_USER_ERROR_CODE: u32 = 50000;

/// An error reported by the database server itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    /// Vendor error number
    pub code: u32,
    /// Five character SQLSTATE
    pub sqlstate: String,
    /// Server supplied message
    pub message: String,
}

impl DatabaseError {
    pub fn new(code: u32, sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }

    /// Whether the error was raised on purpose by database logic
    /// (a validation failure meant for end users).
    pub fn is_user_raised(&self) -> bool {
        self.sqlstate == USER_ERROR_SQLSTATE
            || self.code == u32::from(MYSQL_SIGNAL_ERROR_CODE)
            || self.code == SQLSERVER_USER_ERROR_CODE
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {}", self.code, self.sqlstate, self.message)
    }
}

impl std::error::Error for DatabaseError {}

/// Errors that can occur during database operations
#[derive(Error, Debug)]
pub enum Error {
    /// MySQL driver error (network, protocol, pool)
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// Error reported by the database server
    #[error("Database error: {0}")]
    Database(DatabaseError),

    /// Error raised by database logic for the end user.
    ///
    /// The message is the server's message, unchanged, so it can be shown
    /// without any technical context.
    #[error("{message}")]
    User {
        message: String,
        #[source]
        source: DatabaseError,
    },

    /// A parameter value has no database type mapping and none was declared
    #[error("Unsupported parameter type for `{name}`: {type_name}")]
    UnsupportedParameterType {
        name: String,
        type_name: &'static str,
    },

    /// Parameter binding error
    #[error("Binding error: {0}")]
    Binding(String),

    /// Type conversion error
    #[error("Type conversion error: expected {expected}, got {actual}")]
    TypeConversion {
        expected: &'static str,
        actual: String,
    },

    /// Column not found in row
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Null value for non-optional field
    #[error("Unexpected null value for column: {0}")]
    UnexpectedNull(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Row decode error
    #[error("Failed to decode row: {0}")]
    RowDecode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The statement did not complete within its timeout
    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    /// Read attempted on a cursor that has been closed
    #[error("Cursor closed")]
    CursorClosed,

    /// Read attempted on a sequence that was already fully consumed
    #[error("Sequence exhausted")]
    SequenceExhausted,

    /// Statement was built for a transaction that is not the active one
    #[error("Statement belongs to transaction {statement}, but the connection is in {active:?}")]
    TransactionMismatch {
        statement: u64,
        active: Option<u64>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Re-wrap user-raised database errors into [`Error::User`].
    ///
    /// Every other error is returned unchanged.
    pub fn classify(self) -> Self {
        match self {
            Error::Database(db) if db.is_user_raised() => Error::User {
                message: db.message.clone(),
                source: db,
            },
            other => other,
        }
    }

    /// Whether this error carries a message intended for end users.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::User { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
