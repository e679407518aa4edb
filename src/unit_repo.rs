//! Store-Unit Repo (4.I): imports one unit's dependency graph into the
//! persistent store and propagates out-of-date notifications to unit
//! monitors. This is the only component that writes unit/file/provider
//! rows; the Visibility Checker, File-Path Index and Symbol Index all read
//! what this module writes.

use crate::error::{ImportError, ImportResult};
use crate::record_provider::RecordReader;
use crate::store::{PersistentStore, Table};
use crate::store_library::StoreLibrary;
use crate::symbol::ProviderInfo;
use crate::symbol_index::SymbolIndex;
use crate::types::{IdCode, UnitName};
use crate::unit::{OutOfDateTrigger, UnitInfo, UnitMonitor};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Mutex;

const MAX_MAP_DOUBLINGS: u32 = 6;

/// Sink for events the repo can't emit synchronously without creating a
/// module cycle with the scheduler (J) and delegate (K).
pub trait UnitRepoDelegate: Send + Sync {
    fn processed_store_unit(&self, name: &UnitName);
    fn unit_out_of_date(&self, name: &UnitName);
    /// Explicit-output mode only (§4.I step 7): a dependency unit was found
    /// stale or missing and should be enqueued for import even though it is
    /// not itself an explicit output unit.
    fn enqueue_dependency(&self, name: UnitName);
}

pub struct StoreUnitRepo<'a> {
    store: &'a PersistentStore,
    library: &'a dyn StoreLibrary,
    symbol_index: &'a SymbolIndex,
    monitors: DashMap<IdCode, Mutex<UnitMonitor>>,
    watch_enabled: bool,
    explicit_output_mode: bool,
}

impl<'a> StoreUnitRepo<'a> {
    pub fn new(
        store: &'a PersistentStore,
        library: &'a dyn StoreLibrary,
        symbol_index: &'a SymbolIndex,
        watch_enabled: bool,
        explicit_output_mode: bool,
    ) -> Self {
        Self {
            store,
            library,
            symbol_index,
            monitors: DashMap::new(),
            watch_enabled,
            explicit_output_mode,
        }
    }

    pub fn monitor_mod_time(&self, unit_code: IdCode) -> Option<u64> {
        self.monitors.get(&unit_code).map(|m| m.lock().expect("monitor lock poisoned").mod_time)
    }

    pub fn register_unit(&self, name: &UnitName, delegate: &dyn UnitRepoDelegate) -> ImportResult<()> {
        // Step 1: current on-disk mod-time; a read failure is expected
        // transiently in explicit-output mode while the compiler is still
        // writing the unit's output.
        let Ok(on_disk_mod_time) = self.library.unit_mod_time(name) else {
            tracing::debug!(unit = %name, "unit mod-time unreadable, deferring");
            return Ok(());
        };

        // Step 2: decide whether a re-import is needed.
        let stored_mod_time = {
            let read = self.store.read_transaction();
            let stored: Option<UnitInfo> = read.get(Table::UnitInfo, name.as_str()).map_err(store_err)?;
            stored.map(|u| u.mod_time)
        };
        if stored_mod_time == Some(on_disk_mod_time) {
            return Ok(());
        }

        // Step 3: read the unit file.
        let info = self.library.read_unit(name)?;

        // Steps 4-5: import dependencies inside a retrying write transaction.
        self.store
            .run_import(MAX_MAP_DOUBLINGS, |tx| {
                tx.put(Table::UnitInfo, name.as_str(), &info)?;

                if let Some(main_file) = &info.main_file {
                    let file_code = IdCode::of_path(main_file);
                    tx.append(Table::UnitsByFile, &file_code.to_string(), &name.to_string())?;
                    tx.put(Table::FilePathByCode, &file_code.to_string(), &main_file.to_string_lossy().to_string())?;
                }

                for file in &info.file_depends {
                    let file_code = IdCode::of_path(file);
                    tx.append(Table::UnitsContainingFile, &file_code.to_string(), &name.to_string())?;
                    tx.put(Table::FilePathByCode, &file_code.to_string(), &file.to_string_lossy().to_string())?;
                }

                for dep_unit in &info.unit_depends {
                    tx.append(Table::DependentUnitsOfUnit, dep_unit.as_str(), &name.to_string())?;
                }

                // §3 invariant 3 / §4.I step 4: the unit's has_test_symbols
                // flag is the OR of every depended-on provider's own flag,
                // not just whatever `read_unit` happened to report.
                let mut has_test_symbols = false;
                for dep in &info.provider_depends {
                    let provider_code = IdCode::of(&dep.provider_name);
                    let already_seen = {
                        let read = self.store.read_transaction();
                        read.contains(Table::ProviderName, &provider_code.to_string())?
                    };
                    if already_seen {
                        let read = self.store.read_transaction();
                        if read.contains(Table::ProvidersContainingTestSymbols, &provider_code.to_string())? {
                            has_test_symbols = true;
                        }
                        continue;
                    }
                    let provider = ProviderInfo::new(dep.provider_name.clone());
                    let reader = RecordReader::new(self.library, dep.provider_name.clone());
                    let provider_has_test_symbols = self
                        .symbol_index
                        .import_symbols(tx, &provider, &reader)
                        .map_err(import_err_as_store)?;
                    has_test_symbols |= provider_has_test_symbols;
                }

                if has_test_symbols != info.has_test_symbols {
                    let mut corrected = info.clone();
                    corrected.has_test_symbols = has_test_symbols;
                    tx.put(Table::UnitInfo, name.as_str(), &corrected)?;
                }
                Ok(())
            })
            .map_err(store_err)?;

        // Step 6.
        delegate.processed_store_unit(name);

        // Step 7: explicit-output dependency propagation.
        if self.explicit_output_mode {
            for dep_name in &info.unit_depends {
                let stale_or_missing = {
                    let read = self.store.read_transaction();
                    let stored: Option<UnitInfo> = read.get(Table::UnitInfo, dep_name.as_str()).map_err(store_err)?;
                    match (stored, self.library.unit_mod_time(dep_name)) {
                        (None, _) => true,
                        (Some(_), Err(_)) => true,
                        (Some(u), Ok(current)) => u.mod_time != current,
                    }
                };
                if stale_or_missing {
                    delegate.enqueue_dependency(dep_name.clone());
                }
            }
        }

        // Step 8.
        if !info.is_system && self.watch_enabled {
            let monitor = UnitMonitor::new(
                &info,
                |path| {
                    std::fs::metadata(path)
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                        .map(|d| d.as_secs())
                },
                |dep_name| {
                    let code = IdCode::of(dep_name.as_str());
                    let monitor = self.monitors.get(&code)?;
                    let monitor = monitor.lock().expect("monitor lock poisoned");
                    let trigger = monitor.triggers().next()?;
                    Some((trigger.path.clone(), trigger.mod_time))
                },
            );
            if monitor.is_out_of_date() {
                delegate.unit_out_of_date(name);
            }
            self.monitors.insert(info.code(), Mutex::new(monitor));
        }

        Ok(())
    }

    pub fn remove_unit(&self, name: &UnitName) -> ImportResult<()> {
        let code = IdCode::of(name.as_str());
        self.monitors.remove(&code);
        let mut tx = self.store.import_transaction();
        tx.delete(Table::UnitInfo, name.as_str()).map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    /// Direct dependents of `unit_code`, i.e. units whose `unit_depends`
    /// includes this one.
    fn direct_dependents(&self, unit_name: &UnitName) -> ImportResult<Vec<UnitInfo>> {
        let read = self.store.read_transaction();
        let names: Vec<String> = read.get_all(Table::DependentUnitsOfUnit, unit_name.as_str()).map_err(store_err)?;
        let mut out = Vec::new();
        for name in names {
            if let Some(info) = read.get(Table::UnitInfo, &name).map_err(store_err)? {
                out.push(info);
            }
        }
        Ok(out)
    }

    pub fn on_unit_out_of_date(&self, unit_name: &UnitName, trigger: &OutOfDateTrigger, delegate: &dyn UnitRepoDelegate) -> ImportResult<()> {
        let dependents = self.direct_dependents(unit_name)?;
        delegate.unit_out_of_date(unit_name);
        for dependent in dependents {
            if dependent.mod_time >= trigger.mod_time {
                continue;
            }
            if let Some(monitor) = self.monitors.get(&dependent.code()) {
                let mut monitor = monitor.lock().expect("monitor lock poisoned");
                let became_stale = monitor.mark_out_of_date(OutOfDateTrigger::dependency(
                    trigger.path.clone(),
                    trigger.mod_time,
                    unit_name,
                ));
                if became_stale {
                    delegate.unit_out_of_date(&dependent.name);
                }
            }
        }
        Ok(())
    }

    /// Builds a `(file_path, new_mod_time, units_containing_file)` plan for
    /// every known file under any path in `changed_parent_paths`, without
    /// holding the read transaction while monitors are notified.
    fn out_of_date_plan(&self, changed_parent_paths: &[PathBuf]) -> ImportResult<Vec<(PathBuf, u64, Vec<UnitName>)>> {
        let read = self.store.read_transaction();
        let files: Vec<(String, String)> = read.scan_table(Table::FilePathByCode).map_err(store_err)?;

        let mut plan = Vec::new();
        for (code_str, path_str) in files {
            let path = PathBuf::from(&path_str);
            if !changed_parent_paths.iter().any(|parent| path.starts_with(parent)) {
                continue;
            }
            let Ok(metadata) = std::fs::metadata(&path) else { continue };
            let mod_time = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let units: Vec<String> = read.get_all(Table::UnitsContainingFile, &code_str).map_err(store_err)?;
            plan.push((path, mod_time, units.into_iter().map(UnitName::new).collect()));
        }
        Ok(plan)
    }

    pub fn on_fs_event(&self, changed_parent_paths: &[PathBuf], delegate: &dyn UnitRepoDelegate) -> ImportResult<()> {
        let plan = self.out_of_date_plan(changed_parent_paths)?;
        for (path, mod_time, units) in plan {
            self.apply_plan_entry(&path, mod_time, &units, delegate)?;
        }
        Ok(())
    }

    /// Synchronous single-file variant of [`StoreUnitRepo::on_fs_event`].
    pub fn check_unit_containing_file_is_out_of_date(&self, path: &PathBuf, delegate: &dyn UnitRepoDelegate) -> ImportResult<()> {
        let parent = path.parent().map(PathBuf::from).unwrap_or_else(|| path.clone());
        let plan = self.out_of_date_plan(&[parent])?;
        for (plan_path, mod_time, units) in plan {
            if &plan_path == path {
                self.apply_plan_entry(&plan_path, mod_time, &units, delegate)?;
            }
        }
        Ok(())
    }

    fn apply_plan_entry(&self, path: &PathBuf, mod_time: u64, units: &[UnitName], delegate: &dyn UnitRepoDelegate) -> ImportResult<()> {
        for unit_name in units {
            let code = IdCode::of(unit_name.as_str());
            let became_stale = if let Some(monitor) = self.monitors.get(&code) {
                let mut monitor = monitor.lock().expect("monitor lock poisoned");
                monitor.mark_out_of_date(OutOfDateTrigger::own_file(path.clone(), mod_time))
            } else {
                false
            };
            if became_stale {
                let trigger = OutOfDateTrigger::own_file(path.clone(), mod_time);
                self.on_unit_out_of_date(unit_name, &trigger, delegate)?;
            }
        }
        Ok(())
    }
}

fn store_err(e: crate::error::StoreError) -> ImportError {
    ImportError::RecordMalformed { name: "<store>".into(), reason: e.to_string() }
}

fn import_err_as_store(e: ImportError) -> crate::error::StoreError {
    use serde::de::Error as _;
    let message = match &e {
        ImportError::UnitMalformed { reason, .. } | ImportError::RecordMalformed { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    crate::error::StoreError::Serde(serde_json::Error::custom(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_library::LocalStoreLibrary;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct RecordingDelegate {
        processed: AtomicUsize,
    }
    impl UnitRepoDelegate for RecordingDelegate {
        fn processed_store_unit(&self, _name: &UnitName) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
        fn unit_out_of_date(&self, _name: &UnitName) {}
        fn enqueue_dependency(&self, _name: UnitName) {}
    }

    fn write_unit(dir: &TempDir, name: &str, mod_time: u64, main_file: &str) {
        fs::create_dir_all(dir.path().join("units")).unwrap();
        fs::write(
            dir.path().join(format!("units/{name}.unit.json")),
            format!(
                r#"{{"mod_time": {mod_time}, "main_file": "{main_file}", "out_file": null, "target": "x86_64", "sysroot": null, "is_system": false, "symbol_provider_kind": "Clang", "provider_depends": [], "unit_depends": [], "file_depends": ["{main_file}"]}}"#
            ),
        )
        .unwrap();
    }

    #[test]
    fn register_unit_imports_and_notifies_once_then_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_unit(&dir, "U0", 100, "a.c");
        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let symbol_index = SymbolIndex::new();
        let repo = StoreUnitRepo::new(&store, &library, &symbol_index, true, false);
        let delegate = RecordingDelegate { processed: AtomicUsize::new(0) };

        repo.register_unit(&UnitName::new("U0"), &delegate).unwrap();
        assert_eq!(delegate.processed.load(Ordering::SeqCst), 1);

        // Same mod-time: no re-import, no second notification.
        repo.register_unit(&UnitName::new("U0"), &delegate).unwrap();
        assert_eq!(delegate.processed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_unit_creates_a_monitor_when_watch_enabled() {
        let dir = TempDir::new().unwrap();
        write_unit(&dir, "U0", 100, "a.c");
        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let symbol_index = SymbolIndex::new();
        let repo = StoreUnitRepo::new(&store, &library, &symbol_index, true, false);
        let delegate = RecordingDelegate { processed: AtomicUsize::new(0) };

        repo.register_unit(&UnitName::new("U0"), &delegate).unwrap();
        assert!(repo.monitor_mod_time(IdCode::of("U0")).is_some());
    }

    #[test]
    fn register_unit_records_has_test_symbols_from_a_provider() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("units")).unwrap();
        fs::write(
            dir.path().join("units/U0.unit.json"),
            r#"{"mod_time": 100, "main_file": "a.c", "out_file": null, "target": "x86_64", "sysroot": null, "is_system": false, "symbol_provider_kind": "Clang", "provider_depends": [{"provider_name": "R0", "file": "a.c", "module_name": "", "is_system": false}], "unit_depends": [], "file_depends": ["a.c"]}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("records")).unwrap();
        fs::write(
            dir.path().join("records/R0.record.json"),
            r#"{"symbols": [{"usr": "c:@F@test_foo", "name": "test_foo", "kind": "Function", "language": "C", "is_unit_test": true, "occurrences": [
                {"path": "a.c", "line": 1, "column": 1, "roles": 2}
            ]}]}"#,
        )
        .unwrap();

        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let symbol_index = SymbolIndex::new();
        let repo = StoreUnitRepo::new(&store, &library, &symbol_index, false, false);
        let delegate = RecordingDelegate { processed: AtomicUsize::new(0) };

        repo.register_unit(&UnitName::new("U0"), &delegate).unwrap();

        let read = store.read_transaction();
        let stored: UnitInfo = read.get(Table::UnitInfo, "U0").unwrap().unwrap();
        assert!(stored.has_test_symbols);
    }
}
