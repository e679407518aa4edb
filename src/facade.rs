//! Index System Facade (4.L): composes the Visibility Checker, Symbol
//! Index, File-Path Index, Store-Unit Repo, Unit-Event Scheduler and Async
//! Delegate into the single object callers construct.

use crate::config::Settings;
use crate::delegate::{AsyncDelegate, IndexDelegate};
use crate::error::{IndexError, IndexResult};
use crate::file_index::FileIndex;
use crate::path_cache::PathCache;
use crate::scheduler::{UnitEventKind, UnitEventNotification, UnitEventScheduler};
use crate::store::PersistentStore;
use crate::store_library::StoreLibrary;
use crate::symbol_index::SymbolIndex;
use crate::types::UnitName;
use crate::unit_repo::StoreUnitRepo;
use crate::visibility::VisibilityChecker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct CreationOptions {
    pub wait_until_done_initializing: bool,
    pub listen_for_events: bool,
    pub watch_enabled: bool,
    /// Short-circuits every write path (`Store-Unit Repo` import/removal,
    /// the file watcher, and unit-event scheduling). A read-only system
    /// only ever opens the store and serves queries against whatever is
    /// already on disk.
    pub readonly: bool,
}

impl Default for CreationOptions {
    fn default() -> Self {
        Self {
            wait_until_done_initializing: true,
            listen_for_events: true,
            watch_enabled: true,
            readonly: false,
        }
    }
}

/// Owns every component and the library implementations they borrow from.
/// Built as a self-referential-free tree by storing the borrowed pieces
/// (`store`, `library`, `symbol_index`) alongside the components that
/// borrow them, all behind one struct so callers get a single handle.
pub struct IndexSystem {
    store: PersistentStore,
    library: Box<dyn StoreLibrary>,
    symbol_index: SymbolIndex,
    visibility: VisibilityChecker,
    file_index: FileIndex,
    path_cache: PathCache,
    delegate: AsyncDelegate,
    poll_snapshot: Mutex<HashMap<UnitName, u64>>,
    settings: Settings,
    readonly: bool,
}

impl IndexSystem {
    pub fn open(settings: Settings, library: Box<dyn StoreLibrary>, options: CreationOptions) -> IndexResult<Self> {
        let store = PersistentStore::open(&settings.index_path, settings.store.initial_map_size)?;
        let symbol_index = SymbolIndex::new();
        let path_cache = PathCache::from_settings(&settings);
        let visibility = if settings.visibility.use_explicit_output_units {
            VisibilityChecker::explicit_output_mode(PathCache::from_settings(&settings))
        } else {
            VisibilityChecker::main_file_mode(PathCache::from_settings(&settings))
        };
        let delegate = AsyncDelegate::new();

        let system = Self {
            store,
            library,
            symbol_index,
            visibility,
            file_index: FileIndex,
            path_cache,
            delegate,
            poll_snapshot: Mutex::new(HashMap::new()),
            settings,
            readonly: options.readonly,
        };

        if options.readonly {
            // No import, no watcher, no scheduler: a read-only system only
            // ever serves queries against whatever is already in the store.
            return Ok(system);
        }

        if options.listen_for_events {
            let initial = system.scan_for_initial_units()?;
            let repo = StoreUnitRepo::new(&system.store, system.library.as_ref(), &system.symbol_index, options.watch_enabled, system.settings.visibility.use_explicit_output_units);
            let scheduler = UnitEventScheduler::new(&repo, &system.delegate, None);
            scheduler.enqueue_notification(UnitEventNotification {
                events: initial.into_iter().map(|name| (UnitEventKind::Added, name)).collect(),
                is_initial: true,
            });
            if options.wait_until_done_initializing {
                scheduler.process_all().map_err(|e| IndexError::General(e.to_string()))?;
            }
        } else {
            system.poll_once()?;
        }

        Ok(system)
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn add_delegate(&self, delegate: Arc<dyn IndexDelegate>) {
        self.delegate.add_delegate(delegate);
    }

    fn scan_for_initial_units(&self) -> IndexResult<Vec<UnitName>> {
        self.library.list_unit_names().map_err(|source| IndexError::FileRead {
            path: self.settings.store_path.clone(),
            source,
        })
    }

    /// Runs one synchronous poll/import cycle against whatever units exist
    /// right now. Used when event listening is disabled, and directly by
    /// CLI one-shot `import` runs.
    pub fn poll_once(&self) -> IndexResult<()> {
        if self.readonly {
            return Ok(());
        }
        let repo = StoreUnitRepo::new(&self.store, self.library.as_ref(), &self.symbol_index, false, self.settings.visibility.use_explicit_output_units);
        let scheduler = UnitEventScheduler::new(&repo, &self.delegate, None);
        let listing = self.scan_for_initial_units()?;
        let mut snapshot = self.poll_snapshot.lock().expect("poll snapshot lock poisoned");
        let current: HashMap<UnitName, u64> = listing
            .into_iter()
            .filter_map(|name| {
                let mod_time = self.library.unit_mod_time(&name).ok()?;
                Some((name, mod_time))
            })
            .collect();
        scheduler
            .poll_for_unit_changes_and_wait(&mut snapshot, current)
            .map_err(|e| IndexError::General(e.to_string()))
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    pub fn symbol_index(&self) -> &SymbolIndex {
        &self.symbol_index
    }

    pub fn file_index(&self) -> &FileIndex {
        &self.file_index
    }

    pub fn visibility(&self) -> &VisibilityChecker {
        &self.visibility
    }

    pub fn path_cache(&self) -> &PathCache {
        &self.path_cache
    }

    pub fn library(&self) -> &dyn StoreLibrary {
        self.library.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::store_library::LocalStoreLibrary;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn open_with_no_units_completes_immediately() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("units")).unwrap();
        let mut settings = Settings::default();
        settings.store_path = dir.path().to_path_buf();
        settings.index_path = dir.path().join("index");

        let library = Box::new(LocalStoreLibrary::new(dir.path()));
        let system = IndexSystem::open(settings, library, CreationOptions::default()).unwrap();
        assert!(!system.store().read_transaction().contains(crate::store::Table::UnitInfo, "nonexistent").unwrap());
    }

    #[test]
    fn readonly_open_reports_itself_as_readonly_and_skips_the_initial_scan() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("units")).unwrap();
        let mut settings = Settings::default();
        settings.store_path = dir.path().to_path_buf();
        settings.index_path = dir.path().join("index");

        let library = Box::new(LocalStoreLibrary::new(dir.path()));
        let options = CreationOptions { readonly: true, ..CreationOptions::default() };
        let system = IndexSystem::open(settings, library, options).unwrap();
        assert!(system.is_readonly());
        system.poll_once().unwrap();
    }
}
