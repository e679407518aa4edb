//! File-Path Index (4.G): file-level queries over the tables the
//! Store-Unit Repo maintains during import (`units_by_file`,
//! `units_containing_file`, `file_path_by_code`). Read-only: this module
//! never writes to the store.

use crate::error::StoreResult;
use crate::path_cache::PathCache;
use crate::store::{PersistentStore, Table};
use crate::types::{IdCode, UnitName};
use crate::unit::UnitInfo;
use crate::visibility::{RootUnitLookup, VisibilityChecker};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct FileIndex;

impl FileIndex {
    pub fn is_known_file(&self, store: &PersistentStore, path_cache: &PathCache, path: &Path) -> StoreResult<bool> {
        let code = IdCode::of_path(&path_cache.resolve(path, None));
        let read = store.read_transaction();
        read.contains(Table::FilePathByCode, &code.to_string())
    }

    /// Units whose main file is `path`, restricted to visible units.
    pub fn main_units_containing_file(
        &self,
        store: &PersistentStore,
        path_cache: &PathCache,
        visibility: &VisibilityChecker,
        roots: &dyn RootUnitLookup,
        path: &Path,
    ) -> StoreResult<Vec<UnitName>> {
        let code = IdCode::of_path(&path_cache.resolve(path, None));
        let read = store.read_transaction();
        let unit_names: Vec<String> = read.get_all(Table::UnitsByFile, &code.to_string())?;

        let mut visible = Vec::new();
        for name in unit_names {
            let Some(unit): Option<UnitInfo> = read.get(Table::UnitInfo, &name)? else {
                continue;
            };
            if visibility.is_unit_visible(&unit, roots) {
                visible.push(unit.name);
            }
        }
        Ok(visible)
    }

    /// The unit's main file, or `None` for module/PCH units that have none.
    pub fn file_of_unit(&self, store: &PersistentStore, unit: &UnitName) -> StoreResult<Option<PathBuf>> {
        let read = store.read_transaction();
        let info: Option<UnitInfo> = read.get(Table::UnitInfo, unit.as_str())?;
        Ok(info.and_then(|u| u.main_file))
    }

    /// Files the units owning `path` record as file-dependencies,
    /// deduplicated across owning units.
    pub fn includes(&self, store: &PersistentStore, path_cache: &PathCache, path: &Path) -> StoreResult<Vec<PathBuf>> {
        let code = IdCode::of_path(&path_cache.resolve(path, None));
        let read = store.read_transaction();
        let unit_names: Vec<String> = read.get_all(Table::UnitsContainingFile, &code.to_string())?;

        let mut files = HashSet::new();
        for name in unit_names {
            if let Some(unit): Option<UnitInfo> = read.get(Table::UnitInfo, &name)? {
                files.extend(unit.file_depends);
            }
        }
        Ok(files.into_iter().collect())
    }
}

impl Default for FileIndex {
    fn default() -> Self {
        Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use tempfile::TempDir;

    fn unit(name: &str, main_file: &str, file_depends: Vec<&str>) -> UnitInfo {
        UnitInfo {
            name: UnitName::new(name),
            mod_time: 0,
            main_file: Some(PathBuf::from(main_file)),
            out_file: None,
            target: "x86_64".into(),
            sysroot: None,
            is_system: false,
            symbol_provider_kind: ProviderKind::Clang,
            has_test_symbols: false,
            provider_depends: vec![],
            unit_depends: vec![],
            file_depends: file_depends.into_iter().map(PathBuf::from).collect(),
        }
    }

    struct NoRoots;
    impl RootUnitLookup for NoRoots {
        fn root_units_of_unit(&self, _unit_code: IdCode) -> Vec<UnitInfo> {
            Vec::new()
        }
    }

    #[test]
    fn main_units_containing_file_respects_visibility() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path(), 15_000_000).unwrap();
        let path_cache = PathCache::new(vec![]);
        let index = FileIndex;
        let u = unit("U0", "/proj/a.c", vec!["/proj/a.h"]);
        let file_code = IdCode::of_path(Path::new("/proj/a.c"));

        let mut tx = store.import_transaction();
        tx.put(Table::UnitInfo, "U0", &u).unwrap();
        tx.append(Table::UnitsByFile, &file_code.to_string(), &"U0".to_string()).unwrap();
        tx.commit().unwrap();

        let visibility = VisibilityChecker::main_file_mode(PathCache::new(vec![]));
        // Nothing registered yet: legacy mode defaults every unit visible.
        let found = index
            .main_units_containing_file(&store, &path_cache, &visibility, &NoRoots, Path::new("/proj/a.c"))
            .unwrap();
        assert_eq!(found, vec![UnitName::new("U0")]);

        // Registering an unrelated file narrows visibility down to it.
        visibility.register_main_files(&["/proj/other.c"]);
        let found = index
            .main_units_containing_file(&store, &path_cache, &visibility, &NoRoots, Path::new("/proj/a.c"))
            .unwrap();
        assert!(found.is_empty());

        visibility.register_main_files(&["/proj/a.c"]);
        let found = index
            .main_units_containing_file(&store, &path_cache, &visibility, &NoRoots, Path::new("/proj/a.c"))
            .unwrap();
        assert_eq!(found, vec![UnitName::new("U0")]);
    }

    #[test]
    fn includes_unions_file_depends_of_owning_units() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path(), 15_000_000).unwrap();
        let path_cache = PathCache::new(vec![]);
        let index = FileIndex;
        let u = unit("U0", "/proj/a.c", vec!["/proj/a.h", "/proj/b.h"]);
        let file_code = IdCode::of_path(Path::new("/proj/a.c"));

        let mut tx = store.import_transaction();
        tx.put(Table::UnitInfo, "U0", &u).unwrap();
        tx.append(Table::UnitsContainingFile, &file_code.to_string(), &"U0".to_string()).unwrap();
        tx.commit().unwrap();

        let mut found = index.includes(&store, &path_cache, Path::new("/proj/a.c")).unwrap();
        found.sort();
        assert_eq!(found, vec![PathBuf::from("/proj/a.h"), PathBuf::from("/proj/b.h")]);
    }
}
