//! Subcommand implementations.

use super::QueryCommand;
use crate::config::Settings;
use crate::delegate::AsyncDelegate;
use crate::facade::{CreationOptions, IndexSystem};
use crate::pattern::Pattern;
use crate::scheduler::UnitEventScheduler;
use crate::store_library::LocalStoreLibrary;
use crate::symbol_index::AlwaysVisible;
use crate::types::{IdCode, RoleSet, VisitorResult};
use crate::unit_repo::{StoreUnitRepo, UnitRepoDelegate};
use crate::watcher::FsWatcher;
use std::collections::HashMap;
use std::path::PathBuf;

pub fn run_init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Settings::init_config_file(force)?;
    println!("wrote {}", path.display());
    Ok(())
}

pub fn run_config() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load().unwrap_or_else(|_| Settings::default());
    println!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

fn open_system(store_path: PathBuf, wait: bool) -> Result<IndexSystem, Box<dyn std::error::Error>> {
    let mut settings = Settings::load().unwrap_or_else(|_| Settings::default());
    settings.store_path = store_path;
    crate::logging::init_with_config(&settings.logging);
    let library = Box::new(LocalStoreLibrary::new(&settings.store_path));
    let options = CreationOptions { wait_until_done_initializing: wait, ..CreationOptions::default() };
    Ok(IndexSystem::open(settings, library, options)?)
}

pub fn run_import(store_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let _system = open_system(store_path, true)?;
    println!("import complete");
    Ok(())
}

struct LoggingDelegate;
impl UnitRepoDelegate for LoggingDelegate {
    fn processed_store_unit(&self, name: &crate::types::UnitName) {
        tracing::info!(unit = %name, "reimported");
    }
    fn unit_out_of_date(&self, name: &crate::types::UnitName) {
        tracing::info!(unit = %name, "out of date");
    }
    fn enqueue_dependency(&self, _name: crate::types::UnitName) {}
}

/// Opens the index, then alternates between the `notify`-driven file watch
/// and a periodic directory rescan, blocking forever.
pub fn run_watch(store_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let system = open_system(store_path, true)?;
    let repo = StoreUnitRepo::new(system.store(), system.library(), system.symbol_index(), true, false);
    let delegate = AsyncDelegate::new();
    let scheduler = UnitEventScheduler::new(&repo, &delegate, None);
    let fs_watcher = FsWatcher::new(500)?;

    let mut snapshot: HashMap<crate::types::UnitName, u64> = HashMap::new();
    println!("watching, press Ctrl-C to stop");
    loop {
        let names = system.library().list_unit_names()?;
        let current: HashMap<crate::types::UnitName, u64> = names
            .into_iter()
            .filter_map(|name| {
                let mod_time = system.library().unit_mod_time(&name).ok()?;
                Some((name, mod_time))
            })
            .collect();
        scheduler.poll_for_unit_changes_and_wait(&mut snapshot, current)?;

        let changed = fs_watcher.take_ready_paths();
        if !changed.is_empty() {
            repo.on_fs_event(&changed, &LoggingDelegate)?;
        }

        std::thread::sleep(std::time::Duration::from_millis(500));
    }
}

fn print_occurrence(occ: &crate::symbol::SymbolOccurrence) {
    println!(
        "{}:{}:{} roles={:?}",
        occ.location.path.display(),
        occ.location.line,
        occ.location.column,
        occ.roles
    );
}

pub fn run_query(store_path: PathBuf, query: QueryCommand) -> Result<(), Box<dyn std::error::Error>> {
    let system = open_system(store_path, true)?;

    match query {
        QueryCommand::Usr { usr } => {
            let code = IdCode::of(&usr);
            system.symbol_index().for_each_occurrence_by_usr(
                system.store(),
                system.library(),
                code,
                RoleSet::all(),
                &AlwaysVisible,
                |occ| {
                    print_occurrence(&occ);
                    VisitorResult::Continue
                },
            )?;
        }
        QueryCommand::Name { pattern, subsequence, ignore_case } => {
            let pattern = Pattern::new(&pattern).subsequence(subsequence).ignore_case(ignore_case);
            for code in system.symbol_index().usrs_by_pattern(system.store(), &pattern)? {
                println!("{code}");
            }
        }
        QueryCommand::Calls { usr } => {
            let code = IdCode::of(&usr);
            let Some((symbol, roles)) = system.symbol_index().symbol_and_roles_for_usr(system.store(), code)? else {
                println!("no such symbol");
                return Ok(());
            };
            system.symbol_index().for_each_symbol_call_occurrence(
                system.store(),
                system.library(),
                &symbol,
                roles,
                &AlwaysVisible,
                |_code| false,
                |occ| {
                    print_occurrence(&occ);
                    VisitorResult::Continue
                },
            )?;
        }
        QueryCommand::Overrides { usr } => {
            let code = IdCode::of(&usr);
            system.symbol_index().for_each_related_occurrence_by_usr(
                system.store(),
                system.library(),
                code,
                RoleSet::OVERRIDE_OF,
                &AlwaysVisible,
                |occ| {
                    print_occurrence(&occ);
                    VisitorResult::Continue
                },
            )?;
        }
        QueryCommand::File { path } => {
            let units = system.file_index().main_units_containing_file(
                system.store(),
                system.path_cache(),
                system.visibility(),
                &NoRoots,
                &path,
            )?;
            for unit in units {
                println!("{unit}");
            }
        }
    }
    Ok(())
}

struct NoRoots;
impl crate::visibility::RootUnitLookup for NoRoots {
    fn root_units_of_unit(&self, _unit_code: IdCode) -> Vec<crate::unit::UnitInfo> {
        Vec::new()
    }
}

