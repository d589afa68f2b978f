//! Seeded random workload generation.
//!
//! Produces scripts that mix transaction traffic with site failures and
//! recoveries. The same seed always yields the same script.

use std::collections::BTreeSet;

use acdb::{DatabaseConfig, SiteId, TransactionId, VariableId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::script::Command;

/// Shape of a generated workload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadConfig {
    /// Commands to generate before the closing `end`s.
    pub operations: usize,
    /// Transactions open at the same time, at most.
    pub max_open_transactions: usize,
    /// Sites down at the same time, at most.
    pub max_down_sites: usize,
    /// Chance that an opened transaction is read-only.
    pub read_only_probability: f64,
    /// Chance that a command fails or recovers a site.
    pub failure_probability: f64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            operations: 60,
            max_open_transactions: 4,
            max_down_sites: 3,
            read_only_probability: 0.25,
            failure_probability: 0.06,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenTransaction {
    id: TransactionId,
    read_only: bool,
}

/// Deterministic script generator.
#[derive(Debug)]
pub struct Workload {
    rng: ChaCha8Rng,
    database: DatabaseConfig,
    config: WorkloadConfig,
    open: Vec<OpenTransaction>,
    down: BTreeSet<SiteId>,
    next_transaction: u32,
}

impl Workload {
    /// Create a generator for `database` seeded with `seed`.
    pub fn new(seed: u64, database: DatabaseConfig, config: WorkloadConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            database,
            config,
            open: Vec::new(),
            down: BTreeSet::new(),
            next_transaction: 1,
        }
    }

    /// Generate the whole script. Every transaction it opens is ended at the
    /// close, and every failed site recovered.
    pub fn generate(mut self) -> Vec<Command> {
        let mut commands: Vec<Command> = (0..self.config.operations)
            .map(|_| self.next_command())
            .collect();
        commands.extend(self.open.drain(..).map(|tx| Command::End(tx.id)));
        commands.extend(self.down.iter().map(|site| Command::Recover(*site)));
        commands
    }

    fn next_command(&mut self) -> Command {
        if self.rng.random_bool(self.config.failure_probability) {
            return self.site_command();
        }
        let can_open = self.open.len() < self.config.max_open_transactions;
        if self.open.is_empty() || (can_open && self.rng.random_bool(0.2)) {
            return self.begin();
        }

        let index = self.rng.random_range(0..self.open.len());
        let tx = self.open[index];
        if self.rng.random_bool(0.15) {
            self.open.swap_remove(index);
            return Command::End(tx.id);
        }

        let variable = VariableId::new(self.rng.random_range(1..=self.database.variables));
        if tx.read_only || self.rng.random_bool(0.5) {
            Command::Read(tx.id, variable)
        } else {
            Command::Write(tx.id, variable, self.rng.random_range(0..1000))
        }
    }

    fn begin(&mut self) -> Command {
        let id = TransactionId::new(self.next_transaction);
        self.next_transaction += 1;
        let read_only = self.rng.random_bool(self.config.read_only_probability);
        self.open.push(OpenTransaction { id, read_only });
        if read_only {
            Command::BeginReadOnly(id)
        } else {
            Command::Begin(id)
        }
    }

    fn site_command(&mut self) -> Command {
        let site = SiteId::new(self.rng.random_range(1..=self.database.sites));
        if self.down.remove(&site) {
            Command::Recover(site)
        } else if self.down.len() < self.config.max_down_sites {
            self.down.insert(site);
            Command::Fail(site)
        } else {
            Command::Dump
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(seed: u64) -> Vec<Command> {
        Workload::new(seed, DatabaseConfig::default(), WorkloadConfig::default()).generate()
    }

    #[test]
    fn test_same_seed_same_script() {
        assert_eq!(generate(7), generate(7));
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(generate(1), generate(2));
    }

    #[test]
    fn test_every_transaction_ends_and_every_site_recovers() {
        for seed in 0..20 {
            let commands = generate(seed);
            let mut open = BTreeSet::new();
            let mut down = BTreeSet::new();
            for command in &commands {
                match command {
                    Command::Begin(t) | Command::BeginReadOnly(t) => {
                        assert!(open.insert(*t));
                    }
                    Command::End(t) => assert!(open.remove(t)),
                    Command::Read(t, _) => assert!(open.contains(t)),
                    Command::Write(t, _, _) => assert!(open.contains(t)),
                    Command::Fail(s) => assert!(down.insert(*s)),
                    Command::Recover(s) => assert!(down.remove(s)),
                    Command::Dump => {}
                }
            }
            assert!(open.is_empty(), "seed {seed}");
            assert!(down.is_empty(), "seed {seed}");
        }
    }

    #[test]
    fn test_read_only_transactions_never_write() {
        let commands = generate(3);
        let read_only: BTreeSet<TransactionId> = commands
            .iter()
            .filter_map(|command| match command {
                Command::BeginReadOnly(t) => Some(*t),
                _ => None,
            })
            .collect();
        for command in &commands {
            if let Command::Write(t, _, _) = command {
                assert!(!read_only.contains(t));
            }
        }
    }
}
