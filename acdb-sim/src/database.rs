//! The simulator driver.
//!
//! Owns the logical clock and the [`TransactionManager`]. For every command
//! line it advances the clock by one tick, runs deadlock detection, then
//! dispatches the command and prints whatever the core reported.

use std::io::{BufRead, Write};

use acdb::{Event, SiteDump, Timestamp, TransactionManager};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::printer::OutputPrinter;
use crate::script::{parse_line, Command, ScriptError};

/// Counters collected while a script runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Commands dispatched.
    pub steps: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions aborted, for any reason.
    pub aborts: u64,
    /// Deadlock victims among the aborts.
    pub deadlock_victims: u64,
    /// Requests the core rejected.
    pub rejected: u64,
}

impl RunStatistics {
    fn record(&mut self, event: &Event) {
        match event {
            Event::Committed { .. } => self.commits += 1,
            Event::Aborted { .. } => self.aborts += 1,
            Event::DeadlockVictim { .. } => self.deadlock_victims += 1,
            _ => {}
        }
    }
}

/// A running simulation writing its output to `W`.
#[derive(Debug)]
pub struct Database<W: Write> {
    manager: TransactionManager,
    clock: Timestamp,
    printer: OutputPrinter<W>,
    statistics: RunStatistics,
}

impl<W: Write> Database<W> {
    /// Build a database laid out per `config`, printing to `out`.
    pub fn new(config: &SimulationConfig, out: W) -> Result<Self, SimError> {
        let manager = TransactionManager::new(config.database.clone())?;
        Ok(Self {
            manager,
            clock: Timestamp::default(),
            printer: OutputPrinter::new(out, config.format, config.verbose),
            statistics: RunStatistics::default(),
        })
    }

    /// Current logical time.
    pub fn now(&self) -> Timestamp {
        self.clock
    }

    /// The transaction manager, for inspection.
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// Counters so far.
    pub fn statistics(&self) -> RunStatistics {
        self.statistics
    }

    /// Committed values of every site.
    pub fn dump(&self) -> Vec<SiteDump> {
        self.manager.dump()
    }

    /// Advance the clock one tick and break any deadlock.
    pub fn tick(&mut self) -> Result<Timestamp, SimError> {
        self.clock = self.clock.next();
        if self.manager.deadlock_detection(self.clock) {
            debug!(now = %self.clock, "deadlock resolved");
        }
        self.flush_events()?;
        Ok(self.clock)
    }

    /// Dispatch `command` at the current time.
    ///
    /// Requests the core rejects are logged and skipped.
    pub fn dispatch(&mut self, command: Command) -> Result<(), SimError> {
        let now = self.clock;
        self.statistics.steps += 1;
        let result = match command {
            Command::Fail(site) => self.manager.fail_site(site, now),
            Command::Recover(site) => self.manager.recover_site(site, now),
            Command::Dump => {
                self.flush_events()?;
                let dump = self.manager.dump();
                self.printer.print_dump(&dump)?;
                Ok(())
            }
            _ => match command.to_operation(now) {
                Some(operation) => self.manager.handle_request(operation, now).map(|_| ()),
                None => Ok(()),
            },
        };
        if let Err(error) = result {
            self.statistics.rejected += 1;
            warn!(command = %command, now = %now, error = %error, "command rejected");
        }
        self.flush_events()
    }

    /// [`tick`](Self::tick) then [`dispatch`](Self::dispatch).
    pub fn step(&mut self, command: Command) -> Result<(), SimError> {
        self.tick()?;
        self.dispatch(command)
    }

    /// Run a script line by line. Stops at the first malformed line.
    pub fn run_script<R: BufRead>(&mut self, script: R) -> Result<RunStatistics, SimError> {
        for (index, line) in script.lines().enumerate() {
            let line = line?;
            let parsed = parse_line(&line).map_err(|kind| ScriptError {
                line: index + 1,
                kind,
            })?;
            if let Some(command) = parsed {
                self.step(command)?;
            }
        }
        self.printer.flush()?;
        info!(
            now = %self.clock,
            steps = self.statistics.steps,
            commits = self.statistics.commits,
            aborts = self.statistics.aborts,
            "script finished"
        );
        Ok(self.statistics)
    }

    /// Give back the output stream.
    pub fn into_output(self) -> W {
        self.printer.into_inner()
    }

    fn flush_events(&mut self) -> Result<(), SimError> {
        let events = self.manager.take_events();
        for event in &events {
            self.statistics.record(event);
        }
        self.printer.print_events(&events)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use acdb::{SiteId, TransactionId, TransactionStatus};

    use super::*;

    fn run(script: &str, verbose: bool) -> (String, RunStatistics) {
        let config = SimulationConfig {
            verbose,
            ..SimulationConfig::default()
        };
        let mut db = Database::new(&config, Vec::new()).expect("valid config");
        let statistics = db.run_script(script.as_bytes()).expect("script runs");
        let output = String::from_utf8(db.into_output()).expect("utf8");
        (output, statistics)
    }

    #[test]
    fn test_clock_ignores_blank_and_comment_lines() {
        let config = SimulationConfig::default();
        let mut db = Database::new(&config, Vec::new()).expect("valid config");
        db.run_script("begin(T1)\n\n// note\nR(T1, x2)\n".as_bytes())
            .expect("script runs");
        assert_eq!(db.now(), Timestamp::new(2));
    }

    #[test]
    fn test_read_and_commit_output() {
        let (output, statistics) = run("begin(T1)\nR(T1, x4)\nend(T1)\n", false);
        assert_eq!(output, "x4: 40\nT1 commit\n");
        assert_eq!(statistics.commits, 1);
        assert_eq!(statistics.steps, 3);
    }

    #[test]
    fn test_verbose_read() {
        let (output, _) = run("begin(T1)\nR(T1, x4)\n", true);
        assert!(output.contains("x4: 40 read by T1\n"));
        assert!(output.contains("T1 begins\n"));
    }

    #[test]
    fn test_rejected_requests_are_skipped() {
        let (output, statistics) = run("R(T9, x1)\nbegin(T1)\nbegin(T1)\nR(T1, x1)\n", false);
        assert_eq!(output, "x1: 10\n");
        assert_eq!(statistics.rejected, 2);
    }

    #[test]
    fn test_malformed_line_stops_the_run() {
        let config = SimulationConfig::default();
        let mut db = Database::new(&config, Vec::new()).expect("valid config");
        let error = db
            .run_script("begin(T1)\nexplode(T1)\n".as_bytes())
            .expect_err("bad line");
        assert!(matches!(error, SimError::Script(ScriptError { line: 2, .. })));
    }

    #[test]
    fn test_step_by_step() {
        let config = SimulationConfig::default();
        let mut db = Database::new(&config, Vec::new()).expect("valid config");
        db.step(Command::Begin(TransactionId::new(1))).expect("step");
        db.step(Command::Fail(SiteId::new(2))).expect("step");
        db.step(Command::Read(TransactionId::new(1), acdb::VariableId::new(1)))
            .expect("step");
        let status = db
            .manager()
            .transaction(TransactionId::new(1))
            .expect("transaction")
            .status();
        assert_eq!(status, TransactionStatus::Blocked);

        db.step(Command::Recover(SiteId::new(2))).expect("step");
        let output = String::from_utf8(db.into_output()).expect("utf8");
        assert_eq!(output, "x1: 10\n");
    }
}
