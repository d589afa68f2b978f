//! Core types shared by every component of the simulator.
//!
//! This module defines the identifiers and small enums that flow between
//! the data managers, lock managers, sites and the transaction manager:
//!
//! - [`TransactionId`], [`SiteId`], [`VariableId`]: strongly typed identifiers
//! - [`Timestamp`]: the logical clock advanced by the driver
//! - [`LockType`]: shared (read) or exclusive (write) lock
//! - [`TransactionKind`] / [`TransactionStatus`]: per-transaction state
//! - [`TransactionError`]: request-level rejections

use serde::{Deserialize, Serialize};

/// Value stored in a variable.
pub type Value = i64;

/// Transaction identifier, as written in scripts (`T1`, `T2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u32);

impl TransactionId {
    /// Create a new transaction id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Site identifier. Sites are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiteId(pub u32);

impl SiteId {
    /// Create a new site id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "site {}", self.0)
    }
}

/// Variable identifier (`x1` .. `x20` with the default configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(pub u32);

impl VariableId {
    /// Create a new variable id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Logical time, advanced once per input line by the driver.
///
/// The seed entry of every commit history is stamped with
/// [`Timestamp::INITIAL`], which precedes any time the driver can produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Commit time of the initial value of every variable.
    pub const INITIAL: Self = Self(-1);

    /// Create a new timestamp.
    pub const fn new(t: i64) -> Self {
        Self(t)
    }

    /// The next tick.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether `self` lies strictly between `start` and `end`.
    pub fn is_strictly_between(self, start: Timestamp, end: Timestamp) -> bool {
        start < self && self < end
    }

    /// Whether `self` lies between `start` and `end`, both included.
    pub fn is_within(self, start: Timestamp, end: Timestamp) -> bool {
        start <= self && self <= end
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/// Lock modes held in a site's lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockType {
    /// Shared lock.
    Read,
    /// Exclusive lock. Implies [`LockType::Read`].
    Write,
}

impl LockType {
    /// Whether holding `self` satisfies a request for `requested`.
    pub fn covers(self, requested: LockType) -> bool {
        self >= requested
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockType::Read => write!(f, "READ"),
            LockType::Write => write!(f, "WRITE"),
        }
    }
}

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Regular transaction under strict two-phase locking.
    ReadWrite,
    /// Read-only transaction reading a multiversion snapshot.
    ReadOnly,
}

/// Lifecycle state of a transaction.
///
/// `Active ⇄ Blocked → Committed | Aborted`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Running and accepting operations.
    Active,
    /// Waiting for a pending operation to be retried.
    Blocked,
    /// Committed (terminal).
    Committed,
    /// Aborted (terminal).
    Aborted,
}

impl TransactionStatus {
    /// Whether the transaction has finished.
    pub fn is_terminated(self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Blocked => "blocked",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Availability of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SiteStatus {
    /// Serving reads, writes and commits.
    #[default]
    Up,
    /// Failed; lock table and availability flags were wiped.
    Down,
}

/// Requests the transaction manager refuses outright.
///
/// These are malformed requests, not protocol outcomes: a lock conflict,
/// a down site or a failed commit validation never surfaces here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    /// The transaction was never begun.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),

    /// `begin` was issued twice for the same id.
    #[error("transaction {0} already exists")]
    DuplicateTransaction(TransactionId),

    /// The transaction already committed or aborted.
    #[error("transaction {transaction} is {status} and takes no further operations")]
    TransactionTerminated {
        /// The finished transaction.
        transaction: TransactionId,
        /// Its final status.
        status: TransactionStatus,
    },

    /// The variable is outside the configured range.
    #[error("unknown variable {0}")]
    UnknownVariable(VariableId),

    /// The site is outside the configured range.
    #[error("unknown {0}")]
    UnknownSite(SiteId),

    /// A read-only transaction attempted a write.
    #[error("read-only transaction {transaction} cannot write {variable}")]
    WriteInReadOnly {
        /// The read-only transaction.
        transaction: TransactionId,
        /// The variable it tried to write.
        variable: VariableId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(TransactionId::new(3).to_string(), "T3");
        assert_eq!(SiteId::new(2).to_string(), "site 2");
        assert_eq!(VariableId::new(14).to_string(), "x14");
        assert_eq!(Timestamp::new(7).to_string(), "t=7");
    }

    #[test]
    fn test_write_covers_read() {
        assert!(LockType::Write.covers(LockType::Read));
        assert!(LockType::Write.covers(LockType::Write));
        assert!(LockType::Read.covers(LockType::Read));
        assert!(!LockType::Read.covers(LockType::Write));
    }

    #[test]
    fn test_timestamp_strictly_between() {
        let t = Timestamp::new(5);
        assert!(t.is_strictly_between(Timestamp::new(4), Timestamp::new(6)));
        assert!(!t.is_strictly_between(Timestamp::new(5), Timestamp::new(6)));
        assert!(!t.is_strictly_between(Timestamp::new(4), Timestamp::new(5)));
        assert!(Timestamp::INITIAL < Timestamp::default());
    }

    #[test]
    fn test_timestamp_within() {
        let t = Timestamp::new(5);
        assert!(t.is_within(Timestamp::new(5), Timestamp::new(6)));
        assert!(t.is_within(Timestamp::new(4), Timestamp::new(5)));
        assert!(!t.is_within(Timestamp::new(6), Timestamp::new(9)));
    }

    #[test]
    fn test_terminated_statuses() {
        assert!(!TransactionStatus::Active.is_terminated());
        assert!(!TransactionStatus::Blocked.is_terminated());
        assert!(TransactionStatus::Committed.is_terminated());
        assert!(TransactionStatus::Aborted.is_terminated());
    }

    #[test]
    fn test_error_display() {
        let err = TransactionError::TransactionTerminated {
            transaction: TransactionId::new(1),
            status: TransactionStatus::Aborted,
        };
        assert_eq!(
            err.to_string(),
            "transaction T1 is aborted and takes no further operations"
        );
        assert_eq!(
            TransactionError::UnknownSite(SiteId::new(11)).to_string(),
            "unknown site 11"
        );
    }

    #[test]
    fn test_ids_serde_roundtrip() {
        let json = serde_json::to_string(&VariableId::new(4)).expect("serialize");
        assert_eq!(json, "4");
        let decoded: Timestamp = serde_json::from_str("-1").expect("deserialize");
        assert_eq!(decoded, Timestamp::INITIAL);
    }
}
