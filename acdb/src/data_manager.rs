//! Per-site committed data.
//!
//! Each site keeps, for every variable it hosts, an append-only history of
//! committed versions. The history is what read-only transactions read
//! their snapshots from, and its last entry is the current committed value.
//!
//! ```text
//! DataCopy {
//!     history: [(t=-1, 10), (t=4, 100), (t=9, 42)],   // strictly increasing
//!     read_available: bool,
//! }
//! ```
//!
//! A copy stops being read-available when its site fails. Non-replicated
//! copies become available again on recovery; replicated copies only after
//! a commit writes them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::types::{SiteId, Timestamp, Value, VariableId};

/// One committed version of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Logical time of the commit.
    pub commit_time: Timestamp,
    /// Committed value.
    pub value: Value,
}

/// A site's copy of a single variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCopy {
    initial: Version,
    history: Vec<Version>,
    read_available: bool,
    replicated: bool,
}

impl DataCopy {
    /// Create a copy seeded with `initial` at [`Timestamp::INITIAL`].
    pub fn new(initial: Value, replicated: bool) -> Self {
        let initial = Version {
            commit_time: Timestamp::INITIAL,
            value: initial,
        };
        Self {
            initial,
            history: vec![initial],
            read_available: true,
            replicated,
        }
    }

    /// Whether read-write transactions may read this copy.
    pub fn is_read_available(&self) -> bool {
        self.read_available
    }

    /// Whether the variable is copied at every site.
    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// The full commit history, oldest first.
    pub fn history(&self) -> &[Version] {
        &self.history
    }

    /// The latest committed version.
    pub fn latest(&self) -> Version {
        self.history.last().copied().unwrap_or(self.initial)
    }

    /// The latest version committed strictly before `before`.
    pub fn version_before(&self, before: Timestamp) -> Option<Version> {
        self.history
            .iter()
            .rev()
            .find(|version| version.commit_time < before)
            .copied()
    }

    fn append(&mut self, commit_time: Timestamp, value: Value) {
        match self.history.last_mut() {
            // Two commits in one tick: keep the later value under that tick.
            Some(last) if last.commit_time >= commit_time => last.value = value,
            _ => self.history.push(Version { commit_time, value }),
        }
        self.read_available = true;
    }
}

/// Committed state of every variable hosted at one site.
#[derive(Debug, Clone)]
pub struct DataManager {
    site: SiteId,
    copies: BTreeMap<VariableId, DataCopy>,
}

impl DataManager {
    /// Create the data manager for `site` with every hosted variable at its
    /// initial value.
    pub fn new(site: SiteId, config: &DatabaseConfig) -> Self {
        let copies = config
            .variable_ids()
            .filter(|variable| config.is_hosted_at(*variable, site))
            .map(|variable| {
                (
                    variable,
                    DataCopy::new(
                        config.initial_value(variable),
                        config.is_replicated(variable),
                    ),
                )
            })
            .collect();
        Self { site, copies }
    }

    /// Whether this site hosts `variable`.
    pub fn hosts(&self, variable: VariableId) -> bool {
        self.copies.contains_key(&variable)
    }

    /// The copy of `variable`, if hosted here.
    pub fn copy(&self, variable: VariableId) -> Option<&DataCopy> {
        self.copies.get(&variable)
    }

    /// All hosted copies, sorted by variable id.
    pub fn copies(&self) -> impl Iterator<Item = (VariableId, &DataCopy)> {
        self.copies.iter().map(|(variable, copy)| (*variable, copy))
    }

    /// Current availability flag. `false` for variables not hosted here.
    pub fn read_available(&self, variable: VariableId) -> bool {
        self.copies
            .get(&variable)
            .is_some_and(DataCopy::is_read_available)
    }

    /// Latest committed value, regardless of availability.
    pub fn read(&self, variable: VariableId) -> Option<Value> {
        self.copies.get(&variable).map(|copy| copy.latest().value)
    }

    /// Latest version committed strictly before `before`.
    ///
    /// Always `Some` for hosted variables as long as `before` is later than
    /// [`Timestamp::INITIAL`].
    pub fn get_snapshot(&self, variable: VariableId, before: Timestamp) -> Option<Version> {
        self.copies
            .get(&variable)
            .and_then(|copy| copy.version_before(before))
    }

    /// Append `time → value` for every listed variable and mark the copies
    /// readable again.
    pub fn commit_variables(&mut self, time: Timestamp, values: &BTreeMap<VariableId, Value>) {
        for (variable, value) in values {
            if let Some(copy) = self.copies.get_mut(variable) {
                copy.append(time, *value);
                debug!(site = %self.site, variable = %variable, value, time = %time, "committed value");
            }
        }
    }

    /// Mark every copy unreadable (site failure).
    pub fn set_all_data_unavailable(&mut self) {
        for copy in self.copies.values_mut() {
            copy.read_available = false;
        }
    }

    /// Mark non-replicated copies readable again (site recovery).
    ///
    /// Replicated copies stay unreadable until a commit writes them.
    pub fn set_all_non_replicated_data_available(&mut self) {
        for copy in self.copies.values_mut().filter(|copy| !copy.replicated) {
            copy.read_available = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_two() -> DataManager {
        DataManager::new(SiteId::new(2), &DatabaseConfig::default())
    }

    fn values(entries: &[(u32, Value)]) -> BTreeMap<VariableId, Value> {
        entries
            .iter()
            .map(|(variable, value)| (VariableId::new(*variable), *value))
            .collect()
    }

    #[test]
    fn test_hosted_variables() {
        let dm = site_two();
        // Site 2 hosts every even variable plus x1 and x11.
        assert!(dm.hosts(VariableId::new(1)));
        assert!(dm.hosts(VariableId::new(11)));
        assert!(dm.hosts(VariableId::new(2)));
        assert!(!dm.hosts(VariableId::new(3)));
        assert_eq!(dm.copies().count(), 12);
        assert_eq!(dm.read(VariableId::new(11)), Some(110));
        assert_eq!(dm.read(VariableId::new(3)), None);
    }

    #[test]
    fn test_commit_appends_history() {
        let mut dm = site_two();
        dm.commit_variables(Timestamp::new(3), &values(&[(2, 7)]));
        dm.commit_variables(Timestamp::new(8), &values(&[(2, 9)]));

        let copy = dm.copy(VariableId::new(2)).expect("hosted");
        let times: Vec<i64> = copy.history().iter().map(|v| v.commit_time.0).collect();
        assert_eq!(times, vec![-1, 3, 8]);
        assert_eq!(dm.read(VariableId::new(2)), Some(9));
    }

    #[test]
    fn test_snapshot_is_strictly_before() {
        let mut dm = site_two();
        dm.commit_variables(Timestamp::new(3), &values(&[(2, 7)]));

        let at_three = dm
            .get_snapshot(VariableId::new(2), Timestamp::new(3))
            .expect("seed version");
        assert_eq!(at_three.value, 20);
        assert_eq!(at_three.commit_time, Timestamp::INITIAL);

        let at_four = dm
            .get_snapshot(VariableId::new(2), Timestamp::new(4))
            .expect("version");
        assert_eq!(at_four.value, 7);
    }

    #[test]
    fn test_same_tick_commit_keeps_history_increasing() {
        let mut dm = site_two();
        dm.commit_variables(Timestamp::new(5), &values(&[(4, 1)]));
        dm.commit_variables(Timestamp::new(5), &values(&[(4, 2)]));

        let copy = dm.copy(VariableId::new(4)).expect("hosted");
        assert_eq!(copy.history().len(), 2);
        assert_eq!(copy.latest().value, 2);
    }

    #[test]
    fn test_fail_and_recover_availability() {
        let mut dm = site_two();
        dm.set_all_data_unavailable();
        assert!(!dm.read_available(VariableId::new(1)));
        assert!(!dm.read_available(VariableId::new(2)));

        dm.set_all_non_replicated_data_available();
        assert!(dm.read_available(VariableId::new(1)));
        assert!(!dm.read_available(VariableId::new(2)));

        // A fresh commit makes the replicated copy readable again.
        dm.commit_variables(Timestamp::new(10), &values(&[(2, 5)]));
        assert!(dm.read_available(VariableId::new(2)));
    }

    #[test]
    fn test_commit_ignores_foreign_variables() {
        let mut dm = site_two();
        dm.commit_variables(Timestamp::new(1), &values(&[(3, 99)]));
        assert!(!dm.hosts(VariableId::new(3)));
    }

    #[test]
    fn test_seed_version_is_latest_until_first_commit() {
        let mut copy = DataCopy::new(40, true);
        let seed = Version {
            commit_time: Timestamp::INITIAL,
            value: 40,
        };
        assert_eq!(copy.latest(), seed);
        assert_eq!(copy.history(), &[seed]);

        copy.append(Timestamp::new(2), 44);
        assert_eq!(copy.latest().value, 44);
        assert_eq!(copy.version_before(Timestamp::new(2)), Some(seed));
    }
}
