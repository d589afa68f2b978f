//! Invariant checkers for simulation runs.
//!
//! Each checker inspects a live [`TransactionManager`] and reports the first
//! violation it finds. The chaos runner checks them after every step.
//!
//! ## Safety Properties
//!
//! 1. **Lock exclusivity**: a WRITE lock on a copy is never shared.
//! 2. **Lock ownership**: every lock in a site's table belongs to a live
//!    transaction that accessed the site and knows it holds the lock.
//! 3. **Monotonic history**: commit times of every copy strictly increase.
//! 4. **Replica agreement**: readable copies of a replicated variable on up
//!    sites hold the same latest value.
//! 5. **Snapshot reads**: every value a read-only transaction read was
//!    committed somewhere before the transaction began.
//! 6. **Waiters are blocked**: only blocked transactions have wait-for
//!    edges.
//! 7. **No deadlock survives detection**: right after detection the
//!    wait-for graph is acyclic.
//! 8. **Committed writes are installed**: every site a committed
//!    transaction write-locked a variable at holds a version of it stamped
//!    with the commit time, carrying the written value unless another
//!    transaction committed the same variable there in the same tick.

use std::collections::BTreeMap;

use acdb::{
    LockType, SiteId, Timestamp, TransactionManager, TransactionStatus, Value, VariableId,
};

/// A property that does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invariant `{invariant}` violated: {detail}")]
pub struct InvariantViolation {
    /// Name of the checker.
    pub invariant: String,
    /// What was found.
    pub detail: String,
}

/// A named property of the database.
pub trait Invariant {
    /// The human-readable name of this invariant.
    fn name(&self) -> &str;

    /// Check the property against the current state.
    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation>;

    /// Build a violation report for this invariant.
    fn violation(&self, detail: String) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            detail,
        }
    }
}

/// Invariants that hold after every step.
pub fn steady_state_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(LockExclusivity),
        Box::new(LockOwnership),
        Box::new(MonotonicHistory),
        Box::new(ReplicaAgreement),
        Box::new(SnapshotReads),
        Box::new(WaitersAreBlocked),
        Box::new(CommittedWritesInstalled),
    ]
}

/// At most one holder per copy when any holder has WRITE.
pub struct LockExclusivity;

impl Invariant for LockExclusivity {
    fn name(&self) -> &str {
        "lock_exclusivity"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        for site in manager.sites() {
            let locks = site.lock_manager();
            for variable in locks.locked_variables() {
                let holders: Vec<_> = locks.holders(variable).collect();
                let has_writer = holders.iter().any(|(_, lock)| *lock == LockType::Write);
                if has_writer && holders.len() > 1 {
                    return Err(self.violation(format!(
                        "{variable} at {} has WRITE shared among {holders:?}",
                        site.id()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Site lock tables agree with transaction bookkeeping.
pub struct LockOwnership;

impl Invariant for LockOwnership {
    fn name(&self) -> &str {
        "lock_ownership"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        for site in manager.sites() {
            if !site.is_up() && site.lock_manager().locked_variables().next().is_some() {
                return Err(self.violation(format!("{} is down but holds locks", site.id())));
            }
            for variable in site.lock_manager().locked_variables() {
                for (holder, lock) in site.lock_manager().holders(variable) {
                    let Some(transaction) = manager.transaction(holder) else {
                        return Err(self.violation(format!(
                            "unknown {holder} holds {lock} on {variable} at {}",
                            site.id()
                        )));
                    };
                    if transaction.status().is_terminated() {
                        return Err(self.violation(format!(
                            "{holder} is {} but holds {lock} on {variable} at {}",
                            transaction.status(),
                            site.id()
                        )));
                    }
                    if !transaction.accessed_sites().contains_key(&site.id()) {
                        return Err(self.violation(format!(
                            "{holder} holds {lock} on {variable} at unaccessed {}",
                            site.id()
                        )));
                    }
                    if !transaction.is_holding_lock(lock, variable) {
                        return Err(self.violation(format!(
                            "{holder} holds {lock} on {variable} at {} without recording it",
                            site.id()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Commit times of every copy strictly increase.
pub struct MonotonicHistory;

impl Invariant for MonotonicHistory {
    fn name(&self) -> &str {
        "monotonic_history"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        for site in manager.sites() {
            for (variable, copy) in site.data_manager().copies() {
                let history = copy.history();
                if let Some(pair) = history
                    .windows(2)
                    .find(|pair| pair[0].commit_time >= pair[1].commit_time)
                {
                    return Err(self.violation(format!(
                        "{variable} at {}: {} followed by {}",
                        site.id(),
                        pair[0].commit_time,
                        pair[1].commit_time
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Readable replicated copies on up sites agree.
pub struct ReplicaAgreement;

impl Invariant for ReplicaAgreement {
    fn name(&self) -> &str {
        "replica_agreement"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        let mut seen: BTreeMap<VariableId, (Value, SiteId)> = BTreeMap::new();
        for site in manager.sites().filter(|site| site.is_up()) {
            for (variable, copy) in site.data_manager().copies() {
                if !copy.is_replicated() || !copy.is_read_available() {
                    continue;
                }
                let value = copy.latest().value;
                match seen.get(&variable) {
                    Some((expected, first)) if *expected != value => {
                        return Err(self.violation(format!(
                            "{variable} is {expected} at {first} but {value} at {}",
                            site.id()
                        )));
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(variable, (value, site.id()));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Read-only transactions only see versions committed before they began.
pub struct SnapshotReads;

impl Invariant for SnapshotReads {
    fn name(&self) -> &str {
        "snapshot_reads"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        for transaction in manager.transactions().filter(|tx| tx.is_read_only()) {
            for (variable, value) in transaction.local_cache() {
                let committed_before = manager.sites().any(|site| {
                    site.data_manager().copy(*variable).is_some_and(|copy| {
                        copy.history().iter().any(|version| {
                            version.commit_time < transaction.begin_time()
                                && version.value == *value
                        })
                    })
                });
                if !committed_before {
                    return Err(self.violation(format!(
                        "{} read {variable} = {value}, never committed before {}",
                        transaction.id(),
                        transaction.begin_time()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// No cycle left in the wait-for graph. Only meaningful right after
/// deadlock detection ran.
pub struct AcyclicWaitFor;

impl Invariant for AcyclicWaitFor {
    fn name(&self) -> &str {
        "acyclic_wait_for"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        match manager.wait_for_graph().find_cycle() {
            Some(cycle) => Err(self.violation(format!("cycle {cycle:?} survived detection"))),
            None => Ok(()),
        }
    }
}

/// Blocked transactions are the only ones that wait.
pub struct WaitersAreBlocked;

impl Invariant for WaitersAreBlocked {
    fn name(&self) -> &str {
        "waiters_are_blocked"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        for (waiter, holder) in manager.wait_for_graph().edges() {
            let status = manager.transaction(waiter).map(|tx| tx.status());
            if status != Some(TransactionStatus::Blocked) {
                return Err(self.violation(format!(
                    "{waiter} waits for {holder} but is {status:?}"
                )));
            }
        }
        Ok(())
    }
}

/// No committed write is lost at a site it locked.
pub struct CommittedWritesInstalled;

impl CommittedWritesInstalled {
    /// Whether another committed transaction wrote `variable` at `site`
    /// in tick `time`.
    fn overwritten_in_tick(
        manager: &TransactionManager,
        site: SiteId,
        variable: VariableId,
        time: Timestamp,
        value: Value,
    ) -> bool {
        manager.transactions().any(|other| {
            other.commit_time() == Some(time)
                && other.cached(variable) == Some(value)
                && other
                    .write_sites()
                    .get(&variable)
                    .is_some_and(|sites| sites.contains(&site))
        })
    }
}

impl Invariant for CommittedWritesInstalled {
    fn name(&self) -> &str {
        "committed_writes_installed"
    }

    fn check(&self, manager: &TransactionManager) -> Result<(), InvariantViolation> {
        for transaction in manager.transactions() {
            let Some(commit_time) = transaction.commit_time() else {
                continue;
            };
            for (variable, sites) in transaction.write_sites() {
                let Some(written) = transaction.cached(*variable) else {
                    continue;
                };
                for site in sites {
                    let version = manager
                        .site(*site)
                        .and_then(|s| s.data_manager().copy(*variable))
                        .and_then(|copy| {
                            copy.history()
                                .iter()
                                .find(|version| version.commit_time == commit_time)
                                .copied()
                        });
                    let Some(version) = version else {
                        return Err(self.violation(format!(
                            "{} committed {variable} = {written} at {commit_time} but {site} has no version from then",
                            transaction.id()
                        )));
                    };
                    if version.value != written
                        && !Self::overwritten_in_tick(
                            manager,
                            *site,
                            *variable,
                            commit_time,
                            version.value,
                        )
                    {
                        return Err(self.violation(format!(
                            "{} committed {variable} = {written} at {commit_time} but {site} holds {}",
                            transaction.id(),
                            version.value
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
