//! Transaction manager: the concurrency-control protocol.
//!
//! The manager owns every site, every transaction, the queue of pending
//! operations, the wait-for graph and the failure history of each site.
//!
//! ## Protocol
//!
//! | Operation | Read-write transaction | Read-only transaction |
//! |-----------|------------------------|-----------------------|
//! | read | READ lock on the first up site with a readable copy | latest version committed before begin, from an up site that did not fail since that commit |
//! | write | WRITE lock on every up hosting site, all or nothing | rejected |
//! | commit | refused if an accessed site failed at or after first access; otherwise installs writes at every accessed site | always succeeds |
//!
//! An operation that cannot proceed is queued and its transaction becomes
//! `Blocked`. Queued operations are retried, in arrival order, whenever
//! something that could unblock them happens: an operation completes, a
//! site recovers, or a deadlock victim is aborted. Those entry points run
//! the retry sweep themselves.
//!
//! ## Fairness
//!
//! Before requesting a lock, a read-write operation checks the queue for
//! earlier operations of other read-write transactions on the same
//! variable. A read waits behind the latest queued write; a write waits
//! behind the latest queued write, or behind the trailing run of queued
//! reads. This keeps writers from starving.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DatabaseConfig};
use crate::event::{AbortReason, BlockReason, Event};
use crate::operation::{Operation, OperationKind};
use crate::site::Site;
use crate::transaction::Transaction;
use crate::types::{
    LockType, SiteId, SiteStatus, Timestamp, TransactionError, TransactionId, TransactionKind,
    TransactionStatus, Value, VariableId,
};
use crate::wait_for::WaitForGraph;

/// What happened to a request handed to
/// [`TransactionManager::handle_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestOutcome {
    /// The operation ran to completion.
    Executed,
    /// The operation is waiting in the pending queue.
    Queued,
}

/// Committed values of one site, as reported by
/// [`TransactionManager::dump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDump {
    /// The site.
    pub site: SiteId,
    /// Whether it is up.
    pub status: SiteStatus,
    /// Latest committed value of every hosted variable, sorted by id.
    pub values: Vec<(VariableId, Value)>,
}

#[derive(Debug, Clone, Copy)]
struct PendingOperation {
    sequence: u64,
    operation: Operation,
}

/// Coordinator of every transaction in the simulated database.
#[derive(Debug)]
pub struct TransactionManager {
    config: DatabaseConfig,
    sites: BTreeMap<SiteId, Site>,
    transactions: BTreeMap<TransactionId, Transaction>,
    pending: Vec<PendingOperation>,
    next_sequence: u64,
    wait_for: WaitForGraph,
    failure_history: BTreeMap<SiteId, Vec<Timestamp>>,
    events: Vec<Event>,
}

impl TransactionManager {
    /// Build the sites described by `config`, all up and at initial values.
    pub fn new(config: DatabaseConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sites = config
            .site_ids()
            .map(|id| (id, Site::new(id, &config)))
            .collect();
        Ok(Self {
            config,
            sites,
            transactions: BTreeMap::new(),
            pending: Vec::new(),
            next_sequence: 0,
            wait_for: WaitForGraph::new(),
            failure_history: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Layout this manager was built with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// A transaction, including finished ones.
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    /// Every transaction ever begun, sorted by id.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// A site.
    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(&id)
    }

    /// Every site, sorted by id.
    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    /// Queued operations in arrival order.
    pub fn pending(&self) -> impl Iterator<Item = &Operation> {
        self.pending.iter().map(|pending| &pending.operation)
    }

    /// Current wait-for graph.
    pub fn wait_for_graph(&self) -> &WaitForGraph {
        &self.wait_for
    }

    /// Times `site` failed, oldest first.
    pub fn failure_history(&self, site: SiteId) -> &[Timestamp] {
        self.failure_history
            .get(&site)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Committed values of every site.
    pub fn dump(&self) -> Vec<SiteDump> {
        self.sites
            .values()
            .map(|site| SiteDump {
                site: site.id(),
                status: site.status(),
                values: site.dump(),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Driver entry points
    // ------------------------------------------------------------------

    /// Admit a new operation.
    ///
    /// A blocked transaction's operation is queued behind its earlier ones
    /// without being attempted. Otherwise the operation runs once and is
    /// queued if it cannot complete. Completion triggers a retry sweep.
    pub fn handle_request(
        &mut self,
        operation: Operation,
        now: Timestamp,
    ) -> Result<RequestOutcome, TransactionError> {
        if let Err(error) = self.validate(&operation) {
            warn!(operation = %operation, error = %error, "request rejected");
            return Err(error);
        }

        let blocked = self
            .transactions
            .get(&operation.transaction)
            .is_some_and(|tx| tx.status() == TransactionStatus::Blocked)
            || self.has_pending(operation.transaction);
        if blocked {
            self.enqueue(operation);
            self.block(operation.transaction, BlockReason::PendingOperations);
            return Ok(RequestOutcome::Queued);
        }

        if self.execute_at(operation, now, None) {
            self.retry(now);
            Ok(RequestOutcome::Executed)
        } else {
            self.enqueue(operation);
            Ok(RequestOutcome::Queued)
        }
    }

    /// Run `operation` once without queueing it.
    ///
    /// Returns `false` when it could not complete; the caller is then
    /// responsible for queueing it. A failed commit aborts the transaction
    /// and still counts as completed.
    pub fn execute(
        &mut self,
        operation: Operation,
        now: Timestamp,
    ) -> Result<bool, TransactionError> {
        self.validate(&operation)?;
        Ok(self.execute_at(operation, now, None))
    }

    /// Take `site` down and record the failure.
    pub fn fail_site(&mut self, site: SiteId, now: Timestamp) -> Result<(), TransactionError> {
        self.sites
            .get_mut(&site)
            .ok_or(TransactionError::UnknownSite(site))?
            .fail();
        self.receive_failure_notice(site, now);
        self.events.push(Event::SiteFailed { site });
        Ok(())
    }

    /// Record that `site` failed at `time`.
    pub fn receive_failure_notice(&mut self, site: SiteId, time: Timestamp) {
        self.failure_history.entry(site).or_default().push(time);
    }

    /// Bring `site` back up and retry whatever was waiting for it.
    pub fn recover_site(&mut self, site: SiteId, now: Timestamp) -> Result<(), TransactionError> {
        self.sites
            .get_mut(&site)
            .ok_or(TransactionError::UnknownSite(site))?
            .recover();
        self.events.push(Event::SiteRecovered { site });
        self.retry(now);
        Ok(())
    }

    /// Abort the youngest member of every wait-for cycle until none is left.
    ///
    /// Returns whether anything was aborted; if so the retry sweep has
    /// already run. Ties on begin time go to the lowest transaction id.
    pub fn deadlock_detection(&mut self, now: Timestamp) -> bool {
        if self.wait_for.is_empty() {
            return false;
        }
        self.events.push(Event::WaitsForGraph {
            edges: self.wait_for.edges(),
        });

        let mut aborted = false;
        while let Some(cycle) = self.wait_for.find_cycle() {
            let victim = cycle
                .iter()
                .filter_map(|id| self.transactions.get(id))
                .max_by_key(|tx| (tx.begin_time(), Reverse(tx.id())))
                .map(Transaction::id);
            self.events.push(Event::CycleDetected {
                cycle: cycle.clone(),
            });
            let Some(victim) = victim else {
                break;
            };
            info!(victim = %victim, cycle = ?cycle, "deadlock detected");
            self.events.push(Event::DeadlockVictim {
                transaction: victim,
            });
            self.abort_transaction(victim, AbortReason::Deadlock);
            aborted = true;
        }

        if aborted {
            self.retry(now);
        }
        aborted
    }

    /// Retry queued operations in arrival order until a sweep makes no
    /// progress.
    ///
    /// Within a sweep, once an operation of a transaction is skipped or
    /// fails, the rest of that transaction's operations wait for the next
    /// sweep. Transactions still waiting in the wait-for graph are skipped.
    pub fn retry(&mut self, now: Timestamp) {
        while self.retry_sweep(now) {}
    }

    fn retry_sweep(&mut self, now: Timestamp) -> bool {
        let sequences: Vec<u64> = self.pending.iter().map(|p| p.sequence).collect();
        let mut blocked: BTreeSet<TransactionId> = BTreeSet::new();
        let mut progressed = false;

        for sequence in sequences {
            let Some(operation) = self
                .pending
                .iter()
                .find(|p| p.sequence == sequence)
                .map(|p| p.operation)
            else {
                // Dropped when its transaction finished earlier in the sweep.
                continue;
            };
            let transaction = operation.transaction;
            if blocked.contains(&transaction) {
                continue;
            }
            if self.wait_for.is_waiting(transaction) {
                blocked.insert(transaction);
                continue;
            }

            if self.execute_at(operation, now, Some(sequence)) {
                debug!(operation = %operation, now = %now, "retried operation completed");
                self.pending.retain(|p| p.sequence != sequence);
                progressed = true;
            } else {
                blocked.insert(transaction);
            }
        }
        progressed
    }

    // ------------------------------------------------------------------
    // Protocol operations
    // ------------------------------------------------------------------

    /// Start a read-write transaction.
    pub fn begin(&mut self, id: TransactionId, time: Timestamp) -> Result<(), TransactionError> {
        self.validate(&Operation::begin(id, time))?;
        self.begin_transaction(id, time, TransactionKind::ReadWrite);
        Ok(())
    }

    /// Start a read-only transaction. Snapshots are taken lazily, one
    /// variable at a time, on first read.
    pub fn begin_read_only(
        &mut self,
        id: TransactionId,
        time: Timestamp,
    ) -> Result<(), TransactionError> {
        self.validate(&Operation::begin_read_only(id, time))?;
        self.begin_transaction(id, time, TransactionKind::ReadOnly);
        Ok(())
    }

    /// Attempt a read. `Ok(false)` means the transaction is now blocked.
    pub fn read(
        &mut self,
        id: TransactionId,
        variable: VariableId,
        now: Timestamp,
    ) -> Result<bool, TransactionError> {
        self.validate(&Operation::read(id, variable, now))?;
        Ok(self.read_at(id, variable, now, None))
    }

    /// Attempt a write. `Ok(false)` means the transaction is now blocked.
    pub fn write(
        &mut self,
        id: TransactionId,
        variable: VariableId,
        value: Value,
        now: Timestamp,
    ) -> Result<bool, TransactionError> {
        self.validate(&Operation::write(id, variable, value, now))?;
        Ok(self.write_at(id, variable, value, now, None))
    }

    /// Attempt to commit. `Ok(false)` means validation failed and the
    /// caller must abort the transaction.
    pub fn commit(&mut self, id: TransactionId, now: Timestamp) -> Result<bool, TransactionError> {
        self.validate(&Operation::commit(id, now))?;
        Ok(self.commit_transaction(id, now).is_ok())
    }

    /// Abort a live transaction.
    pub fn abort(&mut self, id: TransactionId, reason: AbortReason) -> Result<(), TransactionError> {
        self.live_transaction(id)?;
        self.abort_transaction(id, reason);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate(&self, operation: &Operation) -> Result<(), TransactionError> {
        let id = operation.transaction;
        match operation.kind {
            OperationKind::Begin | OperationKind::BeginReadOnly => {
                if self.transactions.contains_key(&id) {
                    return Err(TransactionError::DuplicateTransaction(id));
                }
                Ok(())
            }
            OperationKind::Commit => self.live_transaction(id).map(|_| ()),
            OperationKind::Read { variable } => {
                self.live_transaction(id)?;
                self.check_variable(variable)
            }
            OperationKind::Write { variable, .. } => {
                let transaction = self.live_transaction(id)?;
                self.check_variable(variable)?;
                if transaction.is_read_only() {
                    return Err(TransactionError::WriteInReadOnly {
                        transaction: id,
                        variable,
                    });
                }
                Ok(())
            }
        }
    }

    fn live_transaction(&self, id: TransactionId) -> Result<&Transaction, TransactionError> {
        let transaction = self
            .transactions
            .get(&id)
            .ok_or(TransactionError::UnknownTransaction(id))?;
        if transaction.status().is_terminated() {
            return Err(TransactionError::TransactionTerminated {
                transaction: id,
                status: transaction.status(),
            });
        }
        Ok(transaction)
    }

    fn check_variable(&self, variable: VariableId) -> Result<(), TransactionError> {
        if self.config.contains_variable(variable) {
            Ok(())
        } else {
            Err(TransactionError::UnknownVariable(variable))
        }
    }

    fn is_live(&self, id: TransactionId) -> bool {
        self.transactions
            .get(&id)
            .is_some_and(|tx| !tx.status().is_terminated())
    }

    fn has_pending(&self, id: TransactionId) -> bool {
        self.pending.iter().any(|p| p.operation.transaction == id)
    }

    fn enqueue(&mut self, operation: Operation) {
        debug!(operation = %operation, "operation queued");
        self.pending.push(PendingOperation {
            sequence: self.next_sequence,
            operation,
        });
        self.next_sequence += 1;
    }

    /// Dispatch one operation. `queued` is the queue position of a retried
    /// operation; only operations queued before it count for fairness.
    fn execute_at(&mut self, operation: Operation, now: Timestamp, queued: Option<u64>) -> bool {
        let id = operation.transaction;
        match operation.kind {
            OperationKind::Begin => {
                self.begin_transaction(id, operation.arrival, TransactionKind::ReadWrite);
                true
            }
            OperationKind::BeginReadOnly => {
                self.begin_transaction(id, operation.arrival, TransactionKind::ReadOnly);
                true
            }
            _ if !self.is_live(id) => {
                // Left over from a transaction that finished; nothing to do.
                debug!(operation = %operation, "dropping operation of finished transaction");
                true
            }
            OperationKind::Read { variable } => self.read_at(id, variable, now, queued),
            OperationKind::Write { variable, value } => {
                self.write_at(id, variable, value, now, queued)
            }
            OperationKind::Commit => {
                if let Err(reason) = self.commit_transaction(id, now) {
                    self.abort_transaction(id, reason);
                }
                true
            }
        }
    }

    fn begin_transaction(&mut self, id: TransactionId, time: Timestamp, kind: TransactionKind) {
        self.transactions
            .insert(id, Transaction::new(id, time, kind));
        self.events.push(Event::Began {
            transaction: id,
            kind,
        });
        debug!(transaction = %id, time = %time, kind = ?kind, "transaction began");
    }

    fn block(&mut self, id: TransactionId, reason: BlockReason) {
        if let Some(transaction) = self.transactions.get_mut(&id) {
            transaction.set_status(TransactionStatus::Blocked);
        }
        self.events.push(Event::Blocked {
            transaction: id,
            reason,
        });
        debug!(transaction = %id, reason = ?reason, "transaction blocked");
    }

    fn read_at(
        &mut self,
        id: TransactionId,
        variable: VariableId,
        now: Timestamp,
        queued: Option<u64>,
    ) -> bool {
        let Some(transaction) = self.transactions.get_mut(&id) else {
            return false;
        };

        if let Some(value) = transaction.cached(variable) {
            transaction.set_status(TransactionStatus::Active);
            self.events.push(Event::Read {
                transaction: id,
                variable,
                value,
                site: None,
            });
            return true;
        }

        if transaction.is_read_only() {
            let begin_time = transaction.begin_time();
            self.read_snapshot(id, variable, begin_time)
        } else {
            self.read_locked(id, variable, now, queued)
        }
    }

    /// Multiversion read for read-only transactions.
    fn read_snapshot(&mut self, id: TransactionId, variable: VariableId, begin_time: Timestamp) -> bool {
        let found = self
            .config
            .hosting_sites(variable)
            .into_iter()
            .find_map(|site_id| {
                let site = self.sites.get(&site_id).filter(|site| site.is_up())?;
                let version = site.data_manager().get_snapshot(variable, begin_time)?;
                if self.has_failure_between(site_id, version.commit_time, begin_time) {
                    debug!(site = %site_id, variable = %variable, commit_time = %version.commit_time, "snapshot unsafe after failure");
                    return None;
                }
                Some((site_id, version.value))
            });

        let Some((site, value)) = found else {
            self.block(id, BlockReason::NoValidSnapshot);
            return false;
        };
        if let Some(transaction) = self.transactions.get_mut(&id) {
            transaction.cache(variable, value);
            transaction.set_status(TransactionStatus::Active);
        }
        self.events.push(Event::Read {
            transaction: id,
            variable,
            value,
            site: Some(site),
        });
        true
    }

    /// Locking read for read-write transactions.
    fn read_locked(
        &mut self,
        id: TransactionId,
        variable: VariableId,
        now: Timestamp,
        queued: Option<u64>,
    ) -> bool {
        let queued_behind = self.blocking_transactions(id, variable, LockType::Read, queued);
        if !queued_behind.is_empty() {
            self.wait_for.add_edges(id, queued_behind);
            self.block(id, BlockReason::QueuedBehind);
            return false;
        }

        for site_id in self.config.hosting_sites(variable) {
            let Some(site) = self.sites.get_mut(&site_id) else {
                continue;
            };
            if !site.is_up() || !site.data_manager().read_available(variable) {
                continue;
            }
            let Some(value) = site.data_manager().read(variable) else {
                continue;
            };

            let conflicts = site
                .lock_manager_mut()
                .acquire_lock(id, variable, LockType::Read);
            if !conflicts.is_empty() {
                self.wait_for.add_edges(id, conflicts);
                self.block(id, BlockReason::LockConflict);
                return false;
            }

            if let Some(transaction) = self.transactions.get_mut(&id) {
                transaction.add_lock(LockType::Read, variable);
                transaction.cache(variable, value);
                transaction.add_accessed_site(now, site_id);
                transaction.set_status(TransactionStatus::Active);
            }
            self.events.push(Event::Read {
                transaction: id,
                variable,
                value,
                site: Some(site_id),
            });
            return true;
        }

        self.block(id, BlockReason::NoAvailableCopy);
        false
    }

    fn write_at(
        &mut self,
        id: TransactionId,
        variable: VariableId,
        value: Value,
        now: Timestamp,
        queued: Option<u64>,
    ) -> bool {
        let Some(transaction) = self.transactions.get_mut(&id) else {
            return false;
        };
        if transaction.is_holding_lock(LockType::Write, variable) {
            transaction.cache(variable, value);
            transaction.set_status(TransactionStatus::Active);
            self.events.push(Event::Wrote {
                transaction: id,
                variable,
                value,
            });
            return true;
        }

        let queued_behind = self.blocking_transactions(id, variable, LockType::Write, queued);
        if !queued_behind.is_empty() {
            self.wait_for.add_edges(id, queued_behind);
            self.block(id, BlockReason::QueuedBehind);
            return false;
        }

        let mut contacted: Vec<SiteId> = Vec::new();
        let mut granted: Vec<(SiteId, bool)> = Vec::new();
        let mut conflicts: BTreeSet<TransactionId> = BTreeSet::new();
        for site_id in self.config.hosting_sites(variable) {
            let Some(site) = self.sites.get_mut(&site_id) else {
                continue;
            };
            if !site.is_up() {
                continue;
            }
            contacted.push(site_id);

            let lock_manager = site.lock_manager_mut();
            if lock_manager.is_holding_lock(LockType::Write, variable, id) {
                continue;
            }
            let had_read_lock = lock_manager.is_holding_lock(LockType::Read, variable, id);
            let refused = lock_manager.acquire_lock(id, variable, LockType::Write);
            if refused.is_empty() {
                granted.push((site_id, had_read_lock));
            } else {
                conflicts.extend(refused);
            }
        }

        if !conflicts.is_empty() {
            for (site_id, had_read_lock) in granted {
                if let Some(site) = self.sites.get_mut(&site_id) {
                    site.lock_manager_mut()
                        .release_write_lock(id, variable, had_read_lock);
                }
            }
            self.wait_for.add_edges(id, conflicts);
            self.block(id, BlockReason::LockConflict);
            return false;
        }

        if contacted.is_empty() {
            self.block(id, BlockReason::NoAvailableCopy);
            return false;
        }

        if let Some(transaction) = self.transactions.get_mut(&id) {
            for site_id in &contacted {
                transaction.add_accessed_site(now, *site_id);
            }
            transaction.add_lock(LockType::Write, variable);
            transaction.add_write_sites(variable, contacted.iter().copied());
            transaction.cache(variable, value);
            transaction.set_status(TransactionStatus::Active);
        }
        self.events.push(Event::Wrote {
            transaction: id,
            variable,
            value,
        });
        debug!(transaction = %id, variable = %variable, value, sites = ?contacted, "write locked");
        true
    }

    /// Earlier queued requests of other read-write transactions that
    /// `id` must let go first.
    fn blocking_transactions(
        &self,
        id: TransactionId,
        variable: VariableId,
        requested: LockType,
        queued: Option<u64>,
    ) -> BTreeSet<TransactionId> {
        let earlier: Vec<(TransactionId, LockType)> = self
            .pending
            .iter()
            .take_while(|p| queued.is_none_or(|position| p.sequence < position))
            .filter(|p| p.operation.transaction != id && p.operation.variable() == Some(variable))
            .filter(|p| {
                self.transactions
                    .get(&p.operation.transaction)
                    .is_some_and(|tx| !tx.is_read_only() && !tx.status().is_terminated())
            })
            .filter_map(|p| p.operation.lock_type().map(|lock| (p.operation.transaction, lock)))
            .collect();

        match requested {
            LockType::Read => earlier
                .iter()
                .rev()
                .find(|(_, lock)| *lock == LockType::Write)
                .map(|(tx, _)| BTreeSet::from([*tx]))
                .unwrap_or_default(),
            LockType::Write => match earlier.last() {
                None => BTreeSet::new(),
                Some((tx, LockType::Write)) => BTreeSet::from([*tx]),
                Some((_, LockType::Read)) => earlier
                    .iter()
                    .rev()
                    .take_while(|(_, lock)| *lock == LockType::Read)
                    .map(|(tx, _)| *tx)
                    .collect(),
            },
        }
    }

    /// Validate and install a commit. `Err` carries why the transaction
    /// must abort instead.
    fn commit_transaction(&mut self, id: TransactionId, now: Timestamp) -> Result<(), AbortReason> {
        let Some(transaction) = self.transactions.get(&id) else {
            // Unknown transactions are rejected before dispatch.
            return Ok(());
        };

        if !transaction.is_read_only() {
            // A failure in the tick of first access may come after the access.
            for (site, first_access) in transaction.accessed_sites() {
                let down = self.sites.get(site).is_none_or(|s| !s.is_up());
                if down || self.has_failure_since(*site, *first_access, now) {
                    info!(transaction = %id, site = %site, down, "commit refused: accessed site failed");
                    return Err(AbortReason::SiteFailure { site: *site });
                }
            }

            let written = transaction.written_values();
            let accessed: Vec<SiteId> = transaction.accessed_sites().keys().copied().collect();
            for site_id in accessed {
                if let Some(site) = self.sites.get_mut(&site_id) {
                    site.commit(id, now, &written);
                }
            }
        }

        if let Some(transaction) = self.transactions.get_mut(&id) {
            transaction.set_commit_time(now);
        }
        self.finish(id, TransactionStatus::Committed);
        self.events.push(Event::Committed { transaction: id });
        info!(transaction = %id, time = %now, "transaction committed");
        Ok(())
    }

    fn abort_transaction(&mut self, id: TransactionId, reason: AbortReason) {
        let accessed: Vec<SiteId> = self
            .transactions
            .get(&id)
            .map(|tx| tx.accessed_sites().keys().copied().collect())
            .unwrap_or_default();
        for site_id in accessed {
            // Down sites already dropped their lock tables.
            if let Some(site) = self.sites.get_mut(&site_id).filter(|site| site.is_up()) {
                site.abort(id);
            }
        }

        self.finish(id, TransactionStatus::Aborted);
        self.events.push(Event::Aborted {
            transaction: id,
            reason,
        });
        info!(transaction = %id, reason = ?reason, "transaction aborted");
    }

    /// Move a transaction to a terminal status and forget its waits.
    fn finish(&mut self, id: TransactionId, status: TransactionStatus) {
        self.wait_for.remove_transaction(id);
        let before = self.pending.len();
        self.pending.retain(|p| p.operation.transaction != id);
        if self.pending.len() != before {
            debug!(transaction = %id, dropped = before - self.pending.len(), "dropped queued operations");
        }
        if let Some(transaction) = self.transactions.get_mut(&id) {
            transaction.set_status(status);
        }
    }

    fn has_failure_between(&self, site: SiteId, start: Timestamp, end: Timestamp) -> bool {
        self.failure_history(site)
            .iter()
            .any(|failure| failure.is_strictly_between(start, end))
    }

    fn has_failure_since(&self, site: SiteId, start: Timestamp, end: Timestamp) -> bool {
        self.failure_history(site)
            .iter()
            .any(|failure| failure.is_within(start, end))
    }
}
