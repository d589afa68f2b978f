//! Database layout configuration.
//!
//! The layout is fixed at startup: how many sites exist, how many variables
//! exist, and where each variable lives.
//!
//! | Variable | Placement | Initial value |
//! |----------|-----------|---------------|
//! | even id  | every site (replicated) | `10 * id` |
//! | odd id   | home site `1 + id % sites` | `10 * id` |

use serde::{Deserialize, Serialize};

use crate::types::{SiteId, Value, VariableId};

/// Default number of sites.
pub const DEFAULT_SITES: u32 = 10;

/// Default number of variables.
pub const DEFAULT_VARIABLES: u32 = 20;

/// Invalid layout configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// At least one site is required.
    #[error("database needs at least one site")]
    NoSites,

    /// At least one variable is required.
    #[error("database needs at least one variable")]
    NoVariables,
}

/// Static layout of the replicated database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Number of sites, numbered `1..=sites`.
    pub sites: u32,
    /// Number of variables, numbered `1..=variables`.
    pub variables: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sites: DEFAULT_SITES,
            variables: DEFAULT_VARIABLES,
        }
    }
}

impl DatabaseConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sites == 0 {
            return Err(ConfigError::NoSites);
        }
        if self.variables == 0 {
            return Err(ConfigError::NoVariables);
        }
        Ok(())
    }

    /// All site ids in ascending order.
    pub fn site_ids(&self) -> impl Iterator<Item = SiteId> {
        (1..=self.sites).map(SiteId::new)
    }

    /// All variable ids in ascending order.
    pub fn variable_ids(&self) -> impl Iterator<Item = VariableId> {
        (1..=self.variables).map(VariableId::new)
    }

    /// Whether `site` exists in this layout.
    pub fn contains_site(&self, site: SiteId) -> bool {
        (1..=self.sites).contains(&site.0)
    }

    /// Whether `variable` exists in this layout.
    pub fn contains_variable(&self, variable: VariableId) -> bool {
        (1..=self.variables).contains(&variable.0)
    }

    /// Even variables are copied at every site.
    pub fn is_replicated(&self, variable: VariableId) -> bool {
        variable.0 % 2 == 0
    }

    /// The single site holding a non-replicated variable.
    pub fn home_site(&self, variable: VariableId) -> SiteId {
        SiteId::new(1 + variable.0 % self.sites)
    }

    /// Sites holding a copy of `variable`, in the fixed scan order.
    pub fn hosting_sites(&self, variable: VariableId) -> Vec<SiteId> {
        if self.is_replicated(variable) {
            self.site_ids().collect()
        } else {
            vec![self.home_site(variable)]
        }
    }

    /// Whether `site` holds a copy of `variable`.
    pub fn is_hosted_at(&self, variable: VariableId, site: SiteId) -> bool {
        self.contains_variable(variable)
            && (self.is_replicated(variable) || self.home_site(variable) == site)
    }

    /// Value every copy of `variable` starts with.
    pub fn initial_value(&self, variable: VariableId) -> Value {
        10 * Value::from(variable.0)
    }
}
