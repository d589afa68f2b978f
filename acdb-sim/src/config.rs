//! Driver configuration.

use std::path::Path;

use acdb::DatabaseConfig;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::printer::OutputFormat;

/// Settings of one simulator run, loadable from JSON.
///
/// ```json
/// { "database": { "sites": 10, "variables": 20 }, "verbose": true, "format": "text" }
/// ```
///
/// Every field is optional. Command-line flags override the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Site and variable layout.
    pub database: DatabaseConfig,
    /// Print verbose output.
    pub verbose: bool,
    /// Output format.
    pub format: OutputFormat,
}

impl SimulationConfig {
    /// Parse a JSON configuration and validate its database layout.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(json)?;
        config.database.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path).map_err(|source| SimError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let config = SimulationConfig::from_json("{}").expect("valid config");
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.database.sites, 10);
    }

    #[test]
    fn test_partial_json() {
        let config = SimulationConfig::from_json(r#"{"database": {"sites": 4}, "format": "json"}"#)
            .expect("valid config");
        assert_eq!(config.database.sites, 4);
        assert_eq!(config.database.variables, 20);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(!config.verbose);
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let error = SimulationConfig::from_json(r#"{"database": {"sites": 0}}"#)
            .expect_err("zero sites");
        assert!(matches!(error, SimError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let error = SimulationConfig::from_file(Path::new("/nonexistent/acdb.json"))
            .expect_err("missing file");
        assert!(matches!(error, SimError::ConfigFile { .. }));
    }
}
