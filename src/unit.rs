//! Unit and out-of-date-trigger types (3. Data Model: Unit, UnitMonitor).

use crate::types::{IdCode, ProviderKind, UnitName};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// One translation unit's dependency metadata, as read from its unit file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub name: UnitName,
    pub mod_time: u64,
    pub main_file: Option<PathBuf>,
    pub out_file: Option<PathBuf>,
    pub target: Box<str>,
    pub sysroot: Option<PathBuf>,
    pub is_system: bool,
    pub symbol_provider_kind: ProviderKind,
    pub has_test_symbols: bool,
    pub provider_depends: Vec<ProviderDependency>,
    pub unit_depends: Vec<UnitName>,
    pub file_depends: Vec<PathBuf>,
}

impl UnitInfo {
    pub fn code(&self) -> IdCode {
        self.name.code()
    }

    pub fn main_file_code(&self) -> Option<IdCode> {
        self.main_file.as_deref().map(IdCode::of_path)
    }

    pub fn out_file_code(&self) -> Option<IdCode> {
        self.out_file.as_deref().map(IdCode::of_path)
    }
}

/// One provider (record) a unit depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDependency {
    pub provider_name: Box<str>,
    pub file: PathBuf,
    pub module_name: Box<str>,
    pub is_system: bool,
}

/// A reason a unit is believed stale: the path that changed, the mod-time
/// observed, and a human description (own file vs. transitively via a
/// dependency unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfDateTrigger {
    pub path: PathBuf,
    pub mod_time: u64,
    pub description: Box<str>,
}

impl OutOfDateTrigger {
    pub fn own_file(path: PathBuf, mod_time: u64) -> Self {
        Self {
            path,
            mod_time,
            description: "source file modified".into(),
        }
    }

    pub fn dependency(path: PathBuf, mod_time: u64, dependency_unit: &UnitName) -> Self {
        Self {
            path,
            mod_time,
            description: format!("dependency unit '{dependency_unit}' is out of date").into(),
        }
    }

    pub fn directory_deleted(path: PathBuf) -> Self {
        Self {
            path,
            mod_time: u64::MAX,
            description: "containing directory was deleted".into(),
        }
    }
}

/// Runtime-only per-unit watch state (4.H). Not persisted: rebuilt from the
/// store plus a mod-time scan whenever a unit is (re-)registered.
pub struct UnitMonitor {
    pub unit_code: IdCode,
    pub unit_name: UnitName,
    pub mod_time: u64,
    pub user_file_depends: HashSet<PathBuf>,
    pub user_unit_depends: HashSet<UnitName>,
    out_of_date_triggers: std::collections::HashMap<PathBuf, OutOfDateTrigger>,
}

impl UnitMonitor {
    /// `stat_user_file` lets the caller supply the current on-disk mod-time
    /// of a user file without this module touching the filesystem directly;
    /// `dependency_trigger` returns the root-cause `(path, mod_time)` of a
    /// dependency unit's out-of-date state, if it currently has one.
    ///
    /// §4.H: a unit can already be stale the moment it is first watched, if
    /// one of its files changed after the unit file was written, or if a
    /// dependency unit is already out of date. Both are seeded here instead
    /// of waiting for a later filesystem event to discover them.
    pub fn new(
        unit: &UnitInfo,
        stat_user_file: impl Fn(&std::path::Path) -> Option<u64>,
        dependency_trigger: impl Fn(&UnitName) -> Option<(PathBuf, u64)>,
    ) -> Self {
        let user_file_depends: HashSet<PathBuf> = unit
            .file_depends
            .iter()
            .cloned()
            .chain(unit.provider_depends.iter().filter(|d| !d.is_system).map(|d| d.file.clone()))
            .collect();
        let user_unit_depends: HashSet<UnitName> = unit.unit_depends.iter().cloned().collect();

        let mut monitor = Self {
            unit_code: unit.code(),
            unit_name: unit.name.clone(),
            mod_time: unit.mod_time,
            user_file_depends: user_file_depends.clone(),
            user_unit_depends: user_unit_depends.clone(),
            out_of_date_triggers: std::collections::HashMap::new(),
        };

        for path in &user_file_depends {
            if let Some(mod_time) = stat_user_file(path) {
                if mod_time > unit.mod_time {
                    monitor.mark_out_of_date(OutOfDateTrigger::own_file(path.clone(), mod_time));
                }
            }
        }
        for dep_name in &user_unit_depends {
            if let Some((path, mod_time)) = dependency_trigger(dep_name) {
                monitor.mark_out_of_date(OutOfDateTrigger::dependency(path, mod_time, dep_name));
            }
        }

        monitor
    }

    pub fn is_out_of_date(&self) -> bool {
        !self.out_of_date_triggers.is_empty()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &OutOfDateTrigger> {
        self.out_of_date_triggers.values()
    }

    /// Records `trigger` iff it is newer than any trigger already recorded
    /// for the same path (invariant 6 of §3: trigger mod-times never
    /// regress). Returns whether this call changed the out-of-date state
    /// from "up to date" to "out of date", i.e. whether a notification
    /// should fire.
    pub fn mark_out_of_date(&mut self, trigger: OutOfDateTrigger) -> bool {
        let was_up_to_date = !self.is_out_of_date();
        let should_insert = self
            .out_of_date_triggers
            .get(&trigger.path)
            .is_none_or(|existing| trigger.mod_time > existing.mod_time);
        if should_insert {
            self.out_of_date_triggers.insert(trigger.path.clone(), trigger);
        }
        was_up_to_date && should_insert
    }

    /// Called after a successful re-import: the unit is fresh again.
    pub fn reset(&mut self, new_mod_time: u64) {
        self.mod_time = new_mod_time;
        self.out_of_date_triggers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, mod_time: u64) -> UnitInfo {
        UnitInfo {
            name: UnitName::new(name),
            mod_time,
            main_file: Some(PathBuf::from("a.c")),
            out_file: None,
            target: "x86_64".into(),
            sysroot: None,
            is_system: false,
            symbol_provider_kind: ProviderKind::Clang,
            has_test_symbols: false,
            provider_depends: vec![],
            unit_depends: vec![],
            file_depends: vec![PathBuf::from("a.c")],
        }
    }

    fn fresh_monitor(u: &UnitInfo) -> UnitMonitor {
        UnitMonitor::new(u, |_| None, |_| None)
    }

    #[test]
    fn mark_out_of_date_only_fires_once() {
        let mut monitor = fresh_monitor(&unit("U0", 100));
        let first = monitor.mark_out_of_date(OutOfDateTrigger::own_file(PathBuf::from("a.c"), 150));
        assert!(first);
        let second = monitor.mark_out_of_date(OutOfDateTrigger::own_file(PathBuf::from("a.c"), 150));
        assert!(!second);
    }

    #[test]
    fn mark_out_of_date_ignores_older_mod_times() {
        let mut monitor = fresh_monitor(&unit("U0", 100));
        monitor.mark_out_of_date(OutOfDateTrigger::own_file(PathBuf::from("a.c"), 150));
        monitor.mark_out_of_date(OutOfDateTrigger::own_file(PathBuf::from("a.c"), 120));
        let trigger = monitor.triggers().next().unwrap();
        assert_eq!(trigger.mod_time, 150);
    }

    #[test]
    fn reset_clears_triggers() {
        let mut monitor = fresh_monitor(&unit("U0", 100));
        monitor.mark_out_of_date(OutOfDateTrigger::own_file(PathBuf::from("a.c"), 150));
        monitor.reset(150);
        assert!(!monitor.is_out_of_date());
    }

    #[test]
    fn new_seeds_a_trigger_when_a_user_file_is_already_newer_than_the_unit() {
        let u = unit("U0", 100);
        let monitor = UnitMonitor::new(&u, |_| Some(150), |_| None);
        assert!(monitor.is_out_of_date());
        let trigger = monitor.triggers().next().unwrap();
        assert_eq!(trigger.mod_time, 150);
    }

    #[test]
    fn new_does_not_seed_a_trigger_when_files_are_not_newer_than_the_unit() {
        let u = unit("U0", 100);
        let monitor = UnitMonitor::new(&u, |_| Some(50), |_| None);
        assert!(!monitor.is_out_of_date());
    }

    #[test]
    fn new_seeds_a_trigger_from_an_already_out_of_date_dependency() {
        let mut u = unit("U0", 100);
        u.unit_depends.push(UnitName::new("Dep"));
        let monitor = UnitMonitor::new(&u, |_| None, |dep| Some((PathBuf::from("dep.c"), 200)).filter(|_| dep.as_str() == "Dep"));
        assert!(monitor.is_out_of_date());
        let trigger = monitor.triggers().next().unwrap();
        assert_eq!(trigger.mod_time, 200);
    }
}
