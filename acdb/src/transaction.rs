//! Per-transaction bookkeeping kept by the transaction manager.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{
    LockType, SiteId, Timestamp, TransactionId, TransactionKind, TransactionStatus, Value,
    VariableId,
};

/// State of one transaction.
///
/// Reads and writes are buffered in the local cache until commit. The
/// accessed-site map records when each site was first touched; commit
/// validation checks that none of them failed since. The sites each
/// variable was write-locked at are kept after commit, along with the
/// commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: TransactionId,
    begin_time: Timestamp,
    kind: TransactionKind,
    status: TransactionStatus,
    locks: BTreeMap<VariableId, LockType>,
    accessed_sites: BTreeMap<SiteId, Timestamp>,
    local_cache: BTreeMap<VariableId, Value>,
    write_sites: BTreeMap<VariableId, BTreeSet<SiteId>>,
    commit_time: Option<Timestamp>,
}

impl Transaction {
    /// Start a new active transaction.
    pub fn new(id: TransactionId, begin_time: Timestamp, kind: TransactionKind) -> Self {
        Self {
            id,
            begin_time,
            kind,
            status: TransactionStatus::Active,
            locks: BTreeMap::new(),
            accessed_sites: BTreeMap::new(),
            local_cache: BTreeMap::new(),
            write_sites: BTreeMap::new(),
            commit_time: None,
        }
    }

    /// Transaction id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Logical time the transaction began.
    pub fn begin_time(&self) -> Timestamp {
        self.begin_time
    }

    /// Read-write or read-only.
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Whether this is a read-only transaction.
    pub fn is_read_only(&self) -> bool {
        self.kind == TransactionKind::ReadOnly
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: TransactionStatus) {
        self.status = status;
    }

    /// Whether a lock at least as strong as `lock_type` is held on `variable`.
    pub fn is_holding_lock(&self, lock_type: LockType, variable: VariableId) -> bool {
        self.locks
            .get(&variable)
            .is_some_and(|held| held.covers(lock_type))
    }

    /// Record a lock. No-op when an equal or stronger lock is already held.
    pub fn add_lock(&mut self, lock_type: LockType, variable: VariableId) {
        if !self.is_holding_lock(lock_type, variable) {
            self.locks.insert(variable, lock_type);
        }
    }

    /// Locks held, per variable.
    pub fn locks(&self) -> &BTreeMap<VariableId, LockType> {
        &self.locks
    }

    /// Record `site` as accessed at `time` unless it was accessed before.
    pub fn add_accessed_site(&mut self, time: Timestamp, site: SiteId) {
        self.accessed_sites.entry(site).or_insert(time);
    }

    /// First-access time of every site touched.
    pub fn accessed_sites(&self) -> &BTreeMap<SiteId, Timestamp> {
        &self.accessed_sites
    }

    /// Buffer a value read or written by this transaction.
    pub fn cache(&mut self, variable: VariableId, value: Value) {
        self.local_cache.insert(variable, value);
    }

    /// Value buffered for `variable`, if any.
    pub fn cached(&self, variable: VariableId) -> Option<Value> {
        self.local_cache.get(&variable).copied()
    }

    /// All buffered values.
    pub fn local_cache(&self) -> &BTreeMap<VariableId, Value> {
        &self.local_cache
    }

    /// Record the sites `variable` was write-locked at.
    pub fn add_write_sites(
        &mut self,
        variable: VariableId,
        sites: impl IntoIterator<Item = SiteId>,
    ) {
        self.write_sites.entry(variable).or_default().extend(sites);
    }

    /// Sites each written variable was write-locked at.
    pub fn write_sites(&self) -> &BTreeMap<VariableId, BTreeSet<SiteId>> {
        &self.write_sites
    }

    /// When the transaction committed; `None` unless committed.
    pub fn commit_time(&self) -> Option<Timestamp> {
        self.commit_time
    }

    pub(crate) fn set_commit_time(&mut self, time: Timestamp) {
        self.commit_time = Some(time);
    }

    /// Buffered values of variables this transaction write-locked.
    pub fn written_values(&self) -> BTreeMap<VariableId, Value> {
        self.local_cache
            .iter()
            .filter(|(variable, _)| self.is_holding_lock(LockType::Write, **variable))
            .map(|(variable, value)| (*variable, *value))
            .collect()
    }
}
