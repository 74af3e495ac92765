//! Transaction isolation levels

use std::fmt;

/// Transaction isolation level.
///
/// Defines the degree to which one transaction must be isolated from
/// resource or data modifications made by other transactions. When no level
/// is given to `begin`, the server's session default applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Allows dirty reads, non-repeatable reads, and phantom reads.
    ReadUncommitted,

    /// Prevents dirty reads but allows non-repeatable reads and phantom reads.
    ReadCommitted,

    /// Prevents dirty reads and non-repeatable reads but allows phantom reads.
    RepeatableRead,

    /// Full isolation.
    Serializable,
}

impl IsolationLevel {
    /// The SQL keyword form, as used by `SET TRANSACTION ISOLATION LEVEL`.
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}
