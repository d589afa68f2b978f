//! Seeded chaos runs with invariant checking.
//!
//! Each iteration generates a random workload from its own seed, runs it
//! step by step and checks every invariant after every step. A failing seed
//! replays exactly with `acdb-sim chaos --seed <seed> --iterations 1`.

use std::fmt;
use std::io;

use acdb::DatabaseConfig;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::database::{Database, RunStatistics};
use crate::error::SimError;
use crate::invariants::{steady_state_invariants, AcyclicWaitFor, Invariant, InvariantViolation};
use crate::workload::{Workload, WorkloadConfig};

/// Parameters of a chaos campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct ChaosConfig {
    /// Seed of the first iteration; iteration `i` uses `seed + i`.
    pub seed: u64,
    /// Number of iterations.
    pub iterations: usize,
    /// Database layout.
    pub database: DatabaseConfig,
    /// Workload shape.
    pub workload: WorkloadConfig,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            iterations: 100,
            database: DatabaseConfig::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

/// Report of a chaos campaign.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    /// Number of iterations executed
    pub iterations: usize,
    /// Number of iterations where every invariant held
    pub successful_runs: usize,
    /// Number of iterations with a violation
    pub failed_runs: usize,
    /// Seeds used for each iteration
    pub seeds_used: Vec<u64>,
    /// failed seeds
    pub seeds_failing: Vec<u64>,
    /// First violation of each failing seed
    pub violations: Vec<(u64, InvariantViolation)>,
    /// Counters summed over every iteration
    pub totals: RunStatistics,
}

impl SimulationReport {
    /// Calculate the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            (self.successful_runs as f64 / self.iterations as f64) * 100.0
        }
    }

    /// Whether every iteration passed.
    pub fn is_success(&self) -> bool {
        self.failed_runs == 0
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Report ===")?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(f, "Successful: {}", self.successful_runs)?;
        writeln!(f, "Failed: {}", self.failed_runs)?;
        writeln!(f, "Success Rate: {:.2}%", self.success_rate())?;
        writeln!(f)?;
        writeln!(f, "Steps: {}", self.totals.steps)?;
        writeln!(f, "Commits: {}", self.totals.commits)?;
        writeln!(f, "Aborts: {}", self.totals.aborts)?;
        writeln!(f, "Deadlock victims: {}", self.totals.deadlock_victims)?;
        writeln!(f, "Rejected requests: {}", self.totals.rejected)?;

        if !self.seeds_failing.is_empty() {
            writeln!(f)?;
            writeln!(f, "Faulty seeds: {:?}", self.seeds_failing)?;
        }

        if !self.violations.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Invariant Violations ===")?;
            for (seed, violation) in &self.violations {
                writeln!(f, "  - seed {seed}: {violation}")?;
            }
        }

        Ok(())
    }
}

/// Run one seeded iteration. `Err(SimError::Invariant)` on the first
/// violation.
pub fn run_iteration(
    seed: u64,
    database: &DatabaseConfig,
    workload: &WorkloadConfig,
) -> Result<RunStatistics, SimError> {
    let config = SimulationConfig {
        database: database.clone(),
        ..SimulationConfig::default()
    };
    let mut db = Database::new(&config, io::sink())?;
    let invariants = steady_state_invariants();
    let commands = Workload::new(seed, database.clone(), workload.clone()).generate();

    for command in commands {
        db.tick()?;
        AcyclicWaitFor.check(db.manager())?;
        db.dispatch(command)?;
        for invariant in &invariants {
            invariant.check(db.manager())?;
        }
    }
    Ok(db.statistics())
}

/// Run every iteration of a campaign.
pub fn run_chaos(config: &ChaosConfig) -> Result<SimulationReport, SimError> {
    let mut report = SimulationReport::default();
    for iteration in 0..config.iterations {
        let seed = config.seed.wrapping_add(iteration as u64);
        report.iterations += 1;
        report.seeds_used.push(seed);

        match run_iteration(seed, &config.database, &config.workload) {
            Ok(statistics) => {
                report.successful_runs += 1;
                accumulate(&mut report.totals, statistics);
            }
            Err(SimError::Invariant(violation)) => {
                warn!(seed, %violation, "invariant violated");
                report.failed_runs += 1;
                report.seeds_failing.push(seed);
                report.violations.push((seed, violation));
            }
            Err(error) => return Err(error),
        }
    }
    info!(
        iterations = report.iterations,
        failed = report.failed_runs,
        "chaos campaign finished"
    );
    Ok(report)
}

fn accumulate(totals: &mut RunStatistics, run: RunStatistics) {
    totals.steps += run.steps;
    totals.commits += run.commits;
    totals.aborts += run.aborts;
    totals.deadlock_victims += run.deadlock_victims;
    totals.rejected += run.rejected;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = SimulationReport {
            iterations: 2,
            successful_runs: 1,
            failed_runs: 1,
            seeds_used: vec![4, 5],
            seeds_failing: vec![5],
            violations: vec![(
                5,
                InvariantViolation {
                    invariant: "replica_agreement".to_string(),
                    detail: "x2 differs".to_string(),
                },
            )],
            totals: RunStatistics::default(),
        };
        let text = report.to_string();
        assert!(text.contains("Success Rate: 50.00%"));
        assert!(text.contains("Faulty seeds: [5]"));
        assert!(text.contains("seed 5: invariant `replica_agreement` violated: x2 differs"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_small_campaign_passes() {
        let config = ChaosConfig {
            seed: 42,
            iterations: 5,
            ..ChaosConfig::default()
        };
        let report = run_chaos(&config).expect("campaign runs");
        assert_eq!(report.iterations, 5);
        assert_eq!(report.seeds_used, vec![42, 43, 44, 45, 46]);
        assert!(report.is_success(), "{report}");
        assert!(report.totals.steps > 0);
    }
}
