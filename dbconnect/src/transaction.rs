//! Per-connection transaction state

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::{Error, Result};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one transaction, unique within the process.
///
/// Statements carry the id of the transaction they were built for; a
/// connection refuses to run a statement whose transaction is not the one
/// currently active on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Lifecycle of the most recent transaction on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    None,
    Active {
        id: TransactionId,
        savepoints: Vec<String>,
    },
    Committed(TransactionId),
    RolledBack(TransactionId),
}

/// Tracks which transaction, if any, is active on one connection.
///
/// This only keeps state; the connection issues the provider calls and
/// reports back. Commit, rollback and savepoints are no-ops without an
/// active transaction, and each such call is logged at `warn`.
#[derive(Debug)]
pub struct TransactionManager {
    state: TransactionState,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            state: TransactionState::None,
        }
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn active(&self) -> Option<TransactionId> {
        match self.state {
            TransactionState::Active { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn savepoints(&self) -> &[String] {
        match &self.state {
            TransactionState::Active { savepoints, .. } => savepoints,
            _ => &[],
        }
    }

    /// Fail if a transaction is already active: nested transactions are not
    /// supported.
    pub fn ensure_can_begin(&self) -> Result<()> {
        match self.active() {
            Some(id) => Err(Error::Query(format!("transaction already active ({})", id))),
            None => Ok(()),
        }
    }

    /// Record that the provider started a transaction.
    pub fn started(&mut self) -> TransactionId {
        let id = TransactionId::next();
        self.state = TransactionState::Active {
            id,
            savepoints: Vec::new(),
        };
        id
    }

    /// The active transaction a commit, rollback or savepoint call should
    /// apply to; `None` (with a warning) if that call is a no-op.
    pub fn target(&self, operation: &str) -> Option<TransactionId> {
        let active = self.active();
        if active.is_none() {
            warn!(operation, "no active transaction; ignoring");
        }
        active
    }

    pub fn committed(&mut self) {
        if let Some(id) = self.active() {
            self.state = TransactionState::Committed(id);
        }
    }

    pub fn rolled_back(&mut self) {
        if let Some(id) = self.active() {
            self.state = TransactionState::RolledBack(id);
        }
    }

    /// Record a savepoint. Reusing a name moves the marker.
    pub fn saved(&mut self, name: &str) {
        if let TransactionState::Active { savepoints, .. } = &mut self.state {
            savepoints.retain(|s| !s.eq_ignore_ascii_case(name));
            savepoints.push(name.to_string());
        }
    }

    /// Record a rollback to a savepoint: later savepoints are discarded, the
    /// named one is kept.
    pub fn rolled_back_to(&mut self, name: &str) {
        if let TransactionState::Active { savepoints, .. } = &mut self.state {
            if let Some(pos) = savepoints.iter().position(|s| s.eq_ignore_ascii_case(name)) {
                savepoints.truncate(pos + 1);
            }
        }
    }

    /// Check that a statement built for `statement` may run now.
    ///
    /// Statements built without a transaction run under whatever is active.
    pub fn check(&self, statement: Option<TransactionId>) -> Result<()> {
        match statement {
            Some(id) if self.active() != Some(id) => Err(Error::TransactionMismatch {
                statement: id.get(),
                active: self.active().map(TransactionId::get),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut tm = TransactionManager::new();
        assert_eq!(tm.state(), &TransactionState::None);
        assert!(tm.target("commit").is_none());

        let id = tm.started();
        assert_eq!(tm.active(), Some(id));
        assert!(tm.ensure_can_begin().is_err());

        tm.committed();
        assert_eq!(tm.state(), &TransactionState::Committed(id));
        assert!(tm.ensure_can_begin().is_ok());

        let next = tm.started();
        assert_ne!(id, next);
        tm.rolled_back();
        assert_eq!(tm.state(), &TransactionState::RolledBack(next));
    }

    #[test]
    fn test_savepoints() {
        let mut tm = TransactionManager::new();
        tm.saved("ignored");
        assert!(tm.savepoints().is_empty());

        tm.started();
        tm.saved("a");
        tm.saved("b");
        tm.saved("c");
        tm.rolled_back_to("B");
        assert_eq!(tm.savepoints(), ["a", "b"]);
        tm.saved("a");
        assert_eq!(tm.savepoints(), ["b", "a"]);
    }

    #[test]
    fn test_statement_transaction_must_be_active() {
        let mut tm = TransactionManager::new();
        assert!(tm.check(None).is_ok());

        let id = tm.started();
        assert!(tm.check(Some(id)).is_ok());
        assert!(tm.check(None).is_ok());
        tm.committed();

        match tm.check(Some(id)) {
            Err(Error::TransactionMismatch { statement, active }) => {
                assert_eq!(statement, id.get());
                assert_eq!(active, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
