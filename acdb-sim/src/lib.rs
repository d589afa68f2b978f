//! # acdb-sim: Script Driver and Chaos Runner
//!
//! Drives the [`acdb`] transaction manager from line-oriented scripts and
//! from seeded random workloads.
//!
//! ## Script Mode
//!
//! ```text
//! begin(T1)
//! W(T1, x2, 7)
//! fail(3)
//! end(T1)          // T1 commit
//! dump()           // site 1 – x2: 7, x4: 40, ...
//! ```
//!
//! Each command line is one tick of logical time. Deadlock detection runs at
//! the start of every tick, before the command is dispatched.
//!
//! ## Chaos Mode
//!
//! Random scripts from a [`rand_chacha::ChaCha8Rng`] seed are run step by
//! step while every [`invariants::Invariant`] is checked. Failing seeds are
//! listed in the [`chaos::SimulationReport`] and replay exactly.
//!
//! ## Crate Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`script`] | Command grammar and parser |
//! | [`printer`] | Text and JSON-lines output |
//! | [`config`] | `SimulationConfig`, loadable from JSON |
//! | [`database`] | The driver: clock, dispatch, statistics |
//! | [`invariants`] | Safety properties checked during chaos runs |
//! | [`workload`] | Seeded random script generation |
//! | [`chaos`] | Multi-seed runner and `SimulationReport` |
//! | [`error`] | `SimError` |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod chaos;
pub mod config;
pub mod database;
pub mod error;
pub mod invariants;
pub mod printer;
pub mod script;
pub mod workload;

pub use chaos::{run_chaos, run_iteration, ChaosConfig, SimulationReport};
pub use config::SimulationConfig;
pub use database::{Database, RunStatistics};
pub use error::SimError;
pub use invariants::{Invariant, InvariantViolation};
pub use printer::{OutputFormat, OutputPrinter};
pub use script::{parse_line, parse_script, Command, ScriptError, ScriptErrorKind};
pub use workload::{Workload, WorkloadConfig};
