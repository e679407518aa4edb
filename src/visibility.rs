//! Visibility Checker (4.E): decides which units' occurrences are surfaced
//! to queries. Two mutually exclusive modes, chosen at construction; either
//! way the decision is memoised per unit code and invalidated whenever the
//! registered path set changes.

use crate::path_cache::PathCache;
use crate::types::IdCode;
use crate::unit::UnitInfo;
use dashmap::{DashMap, DashSet};
use std::path::Path;

/// Looks up a unit's root units (module/PCH units have no main file of
/// their own; visibility falls back to whichever "real" unit pulled them
/// in). Implemented by the Store-Unit Repo / File-Path Index, which own the
/// reverse-edge tables this walk needs.
pub trait RootUnitLookup {
    fn root_units_of_unit(&self, unit_code: IdCode) -> Vec<UnitInfo>;
}

enum Mode {
    /// Legacy behaviour: a unit is visible iff its main file (or output
    /// file) is one the caller explicitly registered as "being edited".
    MainFile { visible_main_files: DashMap<IdCode, u32> },
    /// A unit is visible iff its output file was explicitly registered,
    /// independent of whether any main file is currently open.
    ExplicitOutput { out_unit_files: DashSet<IdCode> },
}

pub struct VisibilityChecker {
    mode: Mode,
    path_cache: PathCache,
    unit_visibility_cache: DashMap<IdCode, bool>,
}

impl VisibilityChecker {
    pub fn main_file_mode(path_cache: PathCache) -> Self {
        Self {
            mode: Mode::MainFile { visible_main_files: DashMap::new() },
            path_cache,
            unit_visibility_cache: DashMap::new(),
        }
    }

    pub fn explicit_output_mode(path_cache: PathCache) -> Self {
        Self {
            mode: Mode::ExplicitOutput { out_unit_files: DashSet::new() },
            path_cache,
            unit_visibility_cache: DashMap::new(),
        }
    }

    pub fn is_explicit_output_mode(&self) -> bool {
        matches!(self.mode, Mode::ExplicitOutput { .. })
    }

    pub fn register_main_files(&self, paths: &[impl AsRef<Path>]) {
        let Mode::MainFile { visible_main_files } = &self.mode else {
            return;
        };
        for path in paths {
            let code = IdCode::of_path(&self.path_cache.resolve(path.as_ref(), None));
            *visible_main_files.entry(code).or_insert(0) += 1;
        }
        self.unit_visibility_cache.clear();
    }

    pub fn unregister_main_files(&self, paths: &[impl AsRef<Path>]) {
        let Mode::MainFile { visible_main_files } = &self.mode else {
            return;
        };
        for path in paths {
            let code = IdCode::of_path(&self.path_cache.resolve(path.as_ref(), None));
            let mut remove = false;
            if let Some(mut count) = visible_main_files.get_mut(&code) {
                *count = count.saturating_sub(1);
                remove = *count == 0;
            }
            if remove {
                visible_main_files.remove(&code);
            }
        }
        self.unit_visibility_cache.clear();
    }

    pub fn add_unit_out_file_paths(&self, paths: &[impl AsRef<Path>]) {
        let Mode::ExplicitOutput { out_unit_files } = &self.mode else {
            return;
        };
        for path in paths {
            let code = IdCode::of_path(&self.path_cache.resolve(path.as_ref(), None));
            out_unit_files.insert(code);
        }
        self.unit_visibility_cache.clear();
    }

    pub fn remove_unit_out_file_paths(&self, paths: &[impl AsRef<Path>]) {
        let Mode::ExplicitOutput { out_unit_files } = &self.mode else {
            return;
        };
        for path in paths {
            let code = IdCode::of_path(&self.path_cache.resolve(path.as_ref(), None));
            out_unit_files.remove(&code);
        }
        self.unit_visibility_cache.clear();
    }

    /// Is `unit` visible under the current mode? Module/PCH units (no main
    /// file) defer to any root unit that pulled them in.
    pub fn is_unit_visible(&self, unit: &UnitInfo, roots: &dyn RootUnitLookup) -> bool {
        let code = unit.code();
        if let Some(cached) = self.unit_visibility_cache.get(&code) {
            return *cached;
        }

        let visible = if unit.main_file.is_some() || unit.out_file.is_some() {
            self.check_mode(unit)
        } else {
            roots
                .root_units_of_unit(code)
                .iter()
                .any(|root| self.check_mode(root))
        };

        self.unit_visibility_cache.insert(code, visible);
        visible
    }

    fn check_mode(&self, unit: &UnitInfo) -> bool {
        match &self.mode {
            // §3 invariant 5: with nothing registered yet, legacy mode
            // reports every unit visible rather than none.
            Mode::MainFile { visible_main_files } => {
                if visible_main_files.is_empty() {
                    return true;
                }
                unit.main_file_code().is_some_and(|code| visible_main_files.contains_key(&code))
            }
            Mode::ExplicitOutput { out_unit_files } => {
                unit.out_file_code().is_some_and(|code| out_unit_files.contains(&code))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use std::path::PathBuf;

    struct NoRoots;
    impl RootUnitLookup for NoRoots {
        fn root_units_of_unit(&self, _unit_code: IdCode) -> Vec<UnitInfo> {
            Vec::new()
        }
    }

    fn unit(main_file: Option<&str>) -> UnitInfo {
        UnitInfo {
            name: crate::types::UnitName::new("U0"),
            mod_time: 0,
            main_file: main_file.map(PathBuf::from),
            out_file: None,
            target: "x86_64".into(),
            sysroot: None,
            is_system: false,
            symbol_provider_kind: ProviderKind::Clang,
            has_test_symbols: false,
            provider_depends: vec![],
            unit_depends: vec![],
            file_depends: vec![],
        }
    }

    #[test]
    fn main_file_mode_defaults_to_visible_before_any_registration() {
        let checker = VisibilityChecker::main_file_mode(PathCache::new(vec![]));
        let u = unit(Some("/proj/a.c"));
        assert!(checker.is_unit_visible(&u, &NoRoots));

        // Once something else is registered, unregistered files drop out.
        let other = unit(Some("/proj/b.c"));
        checker.register_main_files(&["/proj/b.c"]);
        assert!(!checker.is_unit_visible(&u, &NoRoots));
        assert!(checker.is_unit_visible(&other, &NoRoots));
    }

    #[test]
    fn refcount_keeps_file_visible_until_last_unregister() {
        let checker = VisibilityChecker::main_file_mode(PathCache::new(vec![]));
        let u = unit(Some("/proj/a.c"));
        let other = unit(Some("/proj/b.c"));
        checker.register_main_files(&["/proj/b.c"]);
        checker.register_main_files(&["/proj/a.c"]);
        checker.register_main_files(&["/proj/a.c"]);
        checker.unregister_main_files(&["/proj/a.c"]);
        assert!(checker.is_unit_visible(&u, &NoRoots));

        checker.unregister_main_files(&["/proj/a.c"]);
        assert!(!checker.is_unit_visible(&u, &NoRoots));
        assert!(checker.is_unit_visible(&other, &NoRoots));
    }

    #[test]
    fn explicit_output_mode_ignores_main_file_registration() {
        let checker = VisibilityChecker::explicit_output_mode(PathCache::new(vec![]));
        let mut u = unit(None);
        u.out_file = Some(PathBuf::from("/out/a.o"));
        assert!(!checker.is_unit_visible(&u, &NoRoots));

        checker.add_unit_out_file_paths(&["/out/a.o"]);
        assert!(checker.is_unit_visible(&u, &NoRoots));
    }
}
