//! Per-site lock table.
//!
//! Maps each variable to the transactions holding a lock on it:
//!
//! ```text
//! x2 → { T1: READ, T3: READ }
//! x4 → { T2: WRITE }
//! ```
//!
//! ## Invariant
//!
//! For every variable, either any number of transactions hold `READ`, or
//! exactly one transaction holds `WRITE` and nobody else holds anything.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::types::{LockType, SiteId, TransactionId, VariableId};

/// Lock table of a single site.
#[derive(Debug, Clone)]
pub struct LockManager {
    site: SiteId,
    lock_table: BTreeMap<VariableId, BTreeMap<TransactionId, LockType>>,
}

impl LockManager {
    /// Create an empty lock table for `site`.
    pub fn new(site: SiteId) -> Self {
        Self {
            site,
            lock_table: BTreeMap::new(),
        }
    }

    /// Try to grant `lock_type` on `variable` to `transaction`.
    ///
    /// Returns the set of other transactions standing in the way; an empty
    /// set means the lock was granted. A `READ` is refused only by another
    /// transaction's `WRITE`. A `WRITE` is refused by any other holder. A
    /// `READ` already held is upgraded in place when `WRITE` is granted, and
    /// a request the transaction already satisfies changes nothing.
    pub fn acquire_lock(
        &mut self,
        transaction: TransactionId,
        variable: VariableId,
        lock_type: LockType,
    ) -> BTreeSet<TransactionId> {
        let conflicting: BTreeSet<TransactionId> = self
            .lock_table
            .get(&variable)
            .map(|holders| {
                holders
                    .iter()
                    .filter(|(holder, held)| {
                        **holder != transaction
                            && (lock_type == LockType::Write || **held == LockType::Write)
                    })
                    .map(|(holder, _)| *holder)
                    .collect()
            })
            .unwrap_or_default();

        if conflicting.is_empty() {
            let held = self
                .lock_table
                .entry(variable)
                .or_default()
                .entry(transaction)
                .or_insert(lock_type);
            if lock_type > *held {
                *held = lock_type;
            }
            debug!(site = %self.site, transaction = %transaction, variable = %variable, lock = %lock_type, "lock granted");
        } else {
            debug!(
                site = %self.site,
                transaction = %transaction,
                variable = %variable,
                lock = %lock_type,
                conflicts = ?conflicting,
                "lock refused"
            );
        }
        conflicting
    }

    /// Undo a `WRITE` granted during a write attempt that failed elsewhere.
    ///
    /// Restores the `READ` lock the transaction held before the attempt when
    /// `had_read_lock` is set.
    pub fn release_write_lock(
        &mut self,
        transaction: TransactionId,
        variable: VariableId,
        had_read_lock: bool,
    ) {
        if let Some(holders) = self.lock_table.get_mut(&variable) {
            holders.remove(&transaction);
            if had_read_lock {
                holders.insert(transaction, LockType::Read);
            }
            if holders.is_empty() {
                self.lock_table.remove(&variable);
            }
        } else if had_read_lock {
            self.lock_table
                .entry(variable)
                .or_default()
                .insert(transaction, LockType::Read);
        }
    }

    /// Drop every lock `transaction` holds at this site.
    pub fn release_all_locks(&mut self, transaction: TransactionId) {
        self.lock_table.retain(|_, holders| {
            holders.remove(&transaction);
            !holders.is_empty()
        });
    }

    /// Whether `transaction` holds a lock at least as strong as `lock_type`.
    pub fn is_holding_lock(
        &self,
        lock_type: LockType,
        variable: VariableId,
        transaction: TransactionId,
    ) -> bool {
        self.lock_table
            .get(&variable)
            .and_then(|holders| holders.get(&transaction))
            .is_some_and(|held| held.covers(lock_type))
    }

    /// Holders of `variable`, sorted by transaction id.
    pub fn holders(&self, variable: VariableId) -> impl Iterator<Item = (TransactionId, LockType)> + '_ {
        self.lock_table
            .get(&variable)
            .into_iter()
            .flat_map(|holders| holders.iter().map(|(tx, lock)| (*tx, *lock)))
    }

    /// Variables with at least one holder.
    pub fn locked_variables(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.lock_table.keys().copied()
    }

    /// Wipe the table (site failure).
    pub fn clear(&mut self) {
        self.lock_table.clear();
    }
}
