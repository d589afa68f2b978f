//! Error type of the simulator driver.

use std::io;
use std::path::PathBuf;

use acdb::ConfigError;

use crate::invariants::InvariantViolation;
use crate::script::ScriptError;

/// Anything that stops a simulation run.
///
/// Rejected transaction requests are not errors at this level: the driver
/// logs them and moves on to the next line.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Malformed script line.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Invalid database layout.
    #[error("invalid database configuration: {0}")]
    Config(#[from] ConfigError),

    /// Configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    ConfigFile {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Configuration file is not valid JSON for a `SimulationConfig`.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the script or writing output failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A checked property of the database does not hold.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}
