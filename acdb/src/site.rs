//! A database site: data manager + lock manager + up/down status.

use std::collections::BTreeMap;

use tracing::info;

use crate::config::DatabaseConfig;
use crate::data_manager::DataManager;
use crate::lock_manager::LockManager;
use crate::types::{LockType, SiteId, SiteStatus, Timestamp, TransactionId, Value, VariableId};

/// One site of the replicated database.
#[derive(Debug, Clone)]
pub struct Site {
    id: SiteId,
    status: SiteStatus,
    data_manager: DataManager,
    lock_manager: LockManager,
}

impl Site {
    /// Create an up site holding every variable the layout places on it.
    pub fn new(id: SiteId, config: &DatabaseConfig) -> Self {
        Self {
            id,
            status: SiteStatus::Up,
            data_manager: DataManager::new(id, config),
            lock_manager: LockManager::new(id),
        }
    }

    /// Site id.
    pub fn id(&self) -> SiteId {
        self.id
    }

    /// Current status.
    pub fn status(&self) -> SiteStatus {
        self.status
    }

    /// Whether the site is up.
    pub fn is_up(&self) -> bool {
        self.status == SiteStatus::Up
    }

    /// Committed data.
    pub fn data_manager(&self) -> &DataManager {
        &self.data_manager
    }

    /// Lock table.
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Mutable lock table, used by the transaction manager to acquire and
    /// roll back locks.
    pub fn lock_manager_mut(&mut self) -> &mut LockManager {
        &mut self.lock_manager
    }

    /// Install the writes of `transaction` and release its locks.
    ///
    /// Only variables the transaction write-locked at this site are
    /// committed here. Returns what was installed.
    pub fn commit(
        &mut self,
        transaction: TransactionId,
        time: Timestamp,
        values: &BTreeMap<VariableId, Value>,
    ) -> BTreeMap<VariableId, Value> {
        let written: BTreeMap<VariableId, Value> = values
            .iter()
            .filter(|(variable, _)| {
                self.lock_manager
                    .is_holding_lock(LockType::Write, **variable, transaction)
            })
            .map(|(variable, value)| (*variable, *value))
            .collect();
        self.data_manager.commit_variables(time, &written);
        self.lock_manager.release_all_locks(transaction);
        written
    }

    /// Release the locks of `transaction` without touching data.
    pub fn abort(&mut self, transaction: TransactionId) {
        self.lock_manager.release_all_locks(transaction);
    }

    /// Take the site down: locks are lost and no copy is readable.
    pub fn fail(&mut self) {
        self.status = SiteStatus::Down;
        self.lock_manager.clear();
        self.data_manager.set_all_data_unavailable();
        info!(site = %self.id, "site failed");
    }

    /// Bring the site back up. Replicated copies stay unreadable until
    /// they are written again.
    pub fn recover(&mut self) {
        self.status = SiteStatus::Up;
        self.data_manager.set_all_non_replicated_data_available();
        info!(site = %self.id, "site recovered");
    }

    /// Latest committed value of every hosted variable, sorted by id.
    pub fn dump(&self) -> Vec<(VariableId, Value)> {
        self.data_manager
            .copies()
            .map(|(variable, copy)| (variable, copy.latest().value))
            .collect()
    }
}
