//! Isolation levels and transaction states

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Read isolation of a transaction.
///
/// | Level          | Reads lock the key | Reads see                          |
/// |----------------|--------------------|------------------------------------|
/// | ReadCommitted  | no                 | latest committed version           |
/// | RepeatableRead | yes, until release | latest committed version           |
/// | Snapshot       | no                 | committed as of first read's LSN   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Snapshot,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Snapshot => "snapshot",
        }
    }

    /// Returns true if reads at this level take the key lock.
    pub fn locks_reads(&self) -> bool {
        matches!(self, IsolationLevel::RepeatableRead)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "snapshot" => Ok(IsolationLevel::Snapshot),
            other => Err(format!("unknown isolation level '{}'", other)),
        }
    }
}

/// Lifecycle state of a transaction.
///
/// `Active` is the only state that accepts operations; both terminal states
/// are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_read_committed() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_only_repeatable_read_locks() {
        assert!(IsolationLevel::RepeatableRead.locks_reads());
        assert!(!IsolationLevel::ReadCommitted.locks_reads());
        assert!(!IsolationLevel::Snapshot.locks_reads());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "repeatable-read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!("Snapshot".parse::<IsolationLevel>().unwrap(), IsolationLevel::Snapshot);
        assert!("serializable".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionState::Active.is_terminal());
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::Aborted.is_terminal());
    }
}
