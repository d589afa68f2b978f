//! Observable events emitted by the transaction manager.
//!
//! The core never prints. Each state transition pushes an [`Event`] that
//! the driver drains with
//! [`TransactionManager::take_events`](crate::TransactionManager::take_events)
//! and renders however it likes.

use serde::{Deserialize, Serialize};

use crate::types::{SiteId, TransactionId, TransactionKind, Value, VariableId};

/// Why a transaction was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// Chosen as the victim of a wait-for cycle.
    Deadlock,
    /// An accessed site failed between first access and commit.
    SiteFailure {
        /// The failed site.
        site: SiteId,
    },
}

/// Why an operation could not run now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    /// The transaction already has queued operations.
    PendingOperations,
    /// An earlier queued operation on the same variable goes first.
    QueuedBehind,
    /// Another transaction holds a conflicting lock.
    LockConflict,
    /// No up site has a readable copy (or, for writes, no site is up).
    NoAvailableCopy,
    /// No up site has a snapshot the read-only transaction may read.
    NoValidSnapshot,
}

/// A state transition worth reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A transaction started.
    Began {
        /// New transaction.
        transaction: TransactionId,
        /// Read-write or read-only.
        kind: TransactionKind,
    },
    /// A read returned a value.
    Read {
        /// Reader.
        transaction: TransactionId,
        /// Variable read.
        variable: VariableId,
        /// Value observed.
        value: Value,
        /// Site served from, `None` when answered from the local cache.
        site: Option<SiteId>,
    },
    /// A write was buffered under write locks.
    Wrote {
        /// Writer.
        transaction: TransactionId,
        /// Variable written.
        variable: VariableId,
        /// Value buffered.
        value: Value,
    },
    /// An operation was queued.
    Blocked {
        /// Blocked transaction.
        transaction: TransactionId,
        /// Why.
        reason: BlockReason,
    },
    /// A transaction committed.
    Committed {
        /// Committed transaction.
        transaction: TransactionId,
    },
    /// A transaction aborted.
    Aborted {
        /// Aborted transaction.
        transaction: TransactionId,
        /// Why.
        reason: AbortReason,
    },
    /// Snapshot of the wait-for graph taken before deadlock detection.
    WaitsForGraph {
        /// `(waiter, holder)` edges, sorted.
        edges: Vec<(TransactionId, TransactionId)>,
    },
    /// A wait-for cycle was found.
    CycleDetected {
        /// Members of the cycle, in edge order.
        cycle: Vec<TransactionId>,
    },
    /// A transaction was picked to break a cycle.
    DeadlockVictim {
        /// The victim.
        transaction: TransactionId,
    },
    /// A site went down.
    SiteFailed {
        /// The site.
        site: SiteId,
    },
    /// A site came back.
    SiteRecovered {
        /// The site.
        site: SiteId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_roundtrip() {
        let events = vec![
            Event::Read {
                transaction: TransactionId::new(1),
                variable: VariableId::new(2),
                value: 20,
                site: Some(SiteId::new(1)),
            },
            Event::Aborted {
                transaction: TransactionId::new(2),
                reason: AbortReason::SiteFailure {
                    site: SiteId::new(4),
                },
            },
            Event::CycleDetected {
                cycle: vec![TransactionId::new(1), TransactionId::new(2)],
            },
        ];
        for event in events {
            let json = serde_json::to_string(&event).expect("serialize");
            let decoded: Event = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(event, decoded);
        }
    }
}
