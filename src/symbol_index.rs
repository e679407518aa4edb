//! Symbol Index (4.F): import and lookup over the persistent store's
//! USR/name/kind tables, plus the dynamic-dispatch call-resolution
//! algorithm built on the in-memory [`RelationshipGraph`].

use crate::error::{ImportError, ImportResult, StoreResult};
use crate::pattern::Pattern;
use crate::record_provider::{CoreSymbol, RecordReader};
use crate::relationship::{RelationKind, RelationshipGraph};
use crate::store::{ImportTransaction, PersistentStore, Table};
use crate::symbol::{ProviderInfo, Symbol, SymbolOccurrence};
use crate::types::{IdCode, RoleSet, SymbolKind, VisitorResult};
use crate::unit::UnitInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One `provider_by_usr` row: a provider's aggregated roles/related-roles
/// for a given USR, written once per (usr, provider) pair at import time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProviderRoleEntry {
    provider_code: u64,
    provider_name: Box<str>,
    roles: RoleSet,
    related_roles: RoleSet,
    symbol: Symbol,
}

/// Tells the Symbol Index which providers are currently visible, so lookups
/// can be filtered without this module depending on the Visibility Checker
/// or Store-Unit Repo directly (those own unit-to-provider membership).
pub trait ProviderVisibility {
    fn is_provider_visible(&self, provider_code: IdCode) -> bool;
}

/// Always-visible stand-in, useful for tests and single-unit scans where
/// visibility filtering is a no-op.
pub struct AlwaysVisible;
impl ProviderVisibility for AlwaysVisible {
    fn is_provider_visible(&self, _provider_code: IdCode) -> bool {
        true
    }
}

pub struct SymbolIndex {
    graph: Mutex<RelationshipGraph>,
    /// Query-time count of provider rows whose record file could not be
    /// read (7: "counted as missing_providers_looked_up and treated as
    /// empty"). Reset is not offered; it only ever grows within a process.
    missing_providers_looked_up: AtomicUsize,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self {
            graph: Mutex::new(RelationshipGraph::new()),
            missing_providers_looked_up: AtomicUsize::new(0),
        }
    }

    pub fn missing_providers_looked_up(&self) -> usize {
        self.missing_providers_looked_up.load(Ordering::SeqCst)
    }

    /// Provider rows with no currently-imported unit still depending on
    /// them (9.b). Left in place rather than garbage collected; this is a
    /// diagnostic only, with no automatic cleanup offered.
    pub fn count_unreferenced_providers(&self, store: &PersistentStore) -> StoreResult<usize> {
        let read = store.read_transaction();
        let all_providers: Vec<(String, String)> = read.scan_table(Table::ProviderName)?;
        let all_units: Vec<(String, UnitInfo)> = read.scan_table(Table::UnitInfo)?;

        let mut referenced = HashSet::new();
        for (_, unit) in &all_units {
            for dep in &unit.provider_depends {
                referenced.insert(IdCode::of(&dep.provider_name).to_string());
            }
        }

        Ok(all_providers.iter().filter(|(key, _)| !referenced.contains(key)).count())
    }

    /// Imports one provider's core symbols within an already-open write
    /// transaction. Returns whether any imported definition carried the
    /// `UnitTest` property (4.I uses this to decide monitor registration).
    pub fn import_symbols(
        &self,
        tx: &mut ImportTransaction<'_>,
        provider: &ProviderInfo,
        reader: &RecordReader<'_>,
    ) -> ImportResult<bool> {
        let provider_key = provider.code.to_string();
        tx.put(Table::ProviderName, &provider_key, &provider.name.to_string())
            .map_err(store_err_to_import)?;

        let mut has_test_symbols = false;
        reader.for_each_core_symbol(|core: CoreSymbol| {
            if core.symbol.properties.contains(crate::types::SymbolProperties::UNIT_TEST) {
                has_test_symbols = true;
            }
            let usr_key = core.symbol.code().to_string();
            let entry = ProviderRoleEntry {
                provider_code: provider.code.value(),
                provider_name: provider.name.clone(),
                roles: core.roles,
                related_roles: core.related_roles,
                symbol: core.symbol.clone(),
            };
            if tx.append(Table::ProviderByUsr, &usr_key, &entry).is_err() {
                return VisitorResult::Stop;
            }
            if tx.append(Table::UsrByName, &core.symbol.name, &usr_key).is_err() {
                return VisitorResult::Stop;
            }
            for trigram in trigrams(&core.symbol.name) {
                let _ = tx.append(Table::NameTrigramIndex, &trigram, &usr_key);
            }
            VisitorResult::Continue
        })?;

        if has_test_symbols {
            tx.put(Table::ProvidersContainingTestSymbols, &provider_key, &true)
                .map_err(store_err_to_import)?;
        }

        let mut graph = self.graph.lock().expect("relationship graph lock poisoned");
        reader.for_each_relationship(|from, kind, to| graph.add_edge(crate::relationship::Relationship::new(from, kind, to)))?;

        Ok(has_test_symbols)
    }

    /// All providers known to declare `usr`, regardless of visibility.
    fn providers_for_usr(&self, store: &PersistentStore, usr: IdCode) -> StoreResult<Vec<ProviderRoleEntry>> {
        let read = store.read_transaction();
        read.get_all(Table::ProviderByUsr, &usr.to_string())
    }

    pub fn for_each_occurrence_by_usr(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        usr: IdCode,
        required_roles: RoleSet,
        visibility: &dyn ProviderVisibility,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        let entries = self.providers_for_usr(store, usr).map_err(store_err_to_import)?;
        let mut codes = HashSet::new();
        codes.insert(usr);
        for entry in entries {
            let provider_code = IdCode(entry.provider_code);
            if !visibility.is_provider_visible(provider_code) || !entry.roles.intersects(required_roles) {
                continue;
            }
            let reader = RecordReader::new(library, entry.provider_name.clone());
            let mut stop = false;
            let outcome = reader.for_each_occurrence_by_usr(&codes, required_roles, 0, |occ| {
                if receiver(occ).should_stop() {
                    stop = true;
                    VisitorResult::Stop
                } else {
                    VisitorResult::Continue
                }
            });
            if self.record_missing(outcome)? {
                continue;
            }
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// Maps a per-provider read outcome: a missing/unreadable record is
    /// counted and treated as an empty provider (7); any other error still
    /// propagates. Returns `Ok(true)` when the caller should skip ahead to
    /// the next provider.
    fn record_missing(&self, outcome: ImportResult<()>) -> ImportResult<bool> {
        match outcome {
            Ok(()) => Ok(false),
            Err(ImportError::RecordUnreadable { .. }) => {
                self.missing_providers_looked_up.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            Err(other) => Err(other),
        }
    }

    pub fn for_each_related_occurrence_by_usr(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        usr: IdCode,
        required_roles: RoleSet,
        visibility: &dyn ProviderVisibility,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        let entries = self.providers_for_usr(store, usr).map_err(store_err_to_import)?;
        let mut codes = HashSet::new();
        codes.insert(usr);
        for entry in entries {
            let provider_code = IdCode(entry.provider_code);
            if !visibility.is_provider_visible(provider_code) || !entry.related_roles.intersects(required_roles) {
                continue;
            }
            let reader = RecordReader::new(library, entry.provider_name.clone());
            let mut stop = false;
            let outcome = reader.for_each_occurrence_by_related_usr(&codes, required_roles, 0, |occ| {
                if receiver(occ).should_stop() {
                    stop = true;
                    VisitorResult::Stop
                } else {
                    VisitorResult::Continue
                }
            });
            if self.record_missing(outcome)? {
                continue;
            }
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// The declaration and its roles aggregated across every provider that
    /// imports `usr` (OR'd, the same way `import_symbols` aggregates roles
    /// within one provider). Used by callers that only have a USR and need
    /// the full [`Symbol`] for e.g. dynamic-dispatch call resolution.
    pub fn symbol_and_roles_for_usr(&self, store: &PersistentStore, usr: IdCode) -> StoreResult<Option<(Symbol, RoleSet)>> {
        let entries = self.providers_for_usr(store, usr)?;
        let mut roles = RoleSet::empty();
        let mut symbol = None;
        for entry in entries {
            roles |= entry.roles;
            symbol.get_or_insert(entry.symbol);
        }
        Ok(symbol.map(|s| (s, roles)))
    }

    /// Canonical occurrences of `usr` (4.F): providers with a canonical
    /// occurrence are preferred; if none exists anywhere, any provider with
    /// a `Declaration` is used instead. Buffers the declaration/definition
    /// candidates first since the canonical bit is only known once every
    /// candidate has been seen.
    pub fn for_each_canonical_occurrence_by_usr(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        usr: IdCode,
        visibility: &dyn ProviderVisibility,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        let mut candidates = Vec::new();
        self.for_each_occurrence_by_usr(
            store,
            library,
            usr,
            RoleSet::DECLARATION | RoleSet::DEFINITION,
            visibility,
            |occ| {
                candidates.push(occ);
                VisitorResult::Continue
            },
        )?;

        let has_canonical = candidates.iter().any(SymbolOccurrence::is_canonical);
        for occ in candidates {
            let keep = if has_canonical {
                occ.is_canonical()
            } else {
                occ.roles.contains(RoleSet::DECLARATION)
            };
            if keep && receiver(occ).should_stop() {
                break;
            }
        }
        Ok(())
    }

    /// Canonical occurrences of every USR named `name` exactly.
    pub fn for_each_canonical_occurrence_by_name(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        name: &str,
        visibility: &dyn ProviderVisibility,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        for usr in self.usrs_by_name(store, name).map_err(store_err_to_import)? {
            let mut stop = false;
            self.for_each_canonical_occurrence_by_usr(store, library, usr, visibility, |occ| {
                if receiver(occ).should_stop() {
                    stop = true;
                    VisitorResult::Stop
                } else {
                    VisitorResult::Continue
                }
            })?;
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// Canonical occurrences of every USR whose name matches `pattern`.
    pub fn for_each_canonical_occurrence_by_pattern(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        pattern: &Pattern,
        visibility: &dyn ProviderVisibility,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        for usr in self.usrs_by_pattern(store, pattern).map_err(store_err_to_import)? {
            let mut stop = false;
            self.for_each_canonical_occurrence_by_usr(store, library, usr, visibility, |occ| {
                if receiver(occ).should_stop() {
                    stop = true;
                    VisitorResult::Stop
                } else {
                    VisitorResult::Continue
                }
            })?;
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// Canonical occurrences of every USR of kind `kind`.
    pub fn for_each_canonical_occurrence_by_kind(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        kind: SymbolKind,
        visibility: &dyn ProviderVisibility,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        for usr in self.usrs_by_kind(store, kind).map_err(store_err_to_import)? {
            let mut stop = false;
            self.for_each_canonical_occurrence_by_usr(store, library, usr, visibility, |occ| {
                if receiver(occ).should_stop() {
                    stop = true;
                    VisitorResult::Stop
                } else {
                    VisitorResult::Continue
                }
            })?;
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// USRs whose name matches `name` exactly.
    pub fn usrs_by_name(&self, store: &PersistentStore, name: &str) -> StoreResult<Vec<IdCode>> {
        let read = store.read_transaction();
        let keys: Vec<String> = read.get_all(Table::UsrByName, name)?;
        Ok(keys.into_iter().filter_map(|k| k.parse::<u64>().ok().map(IdCode)).collect())
    }

    /// USRs whose name matches `pattern`. Scans the name index rather than
    /// the trigram shards: trigram narrowing is an optimisation over this
    /// same scan, not a change in semantics, and is left as a follow-up.
    pub fn usrs_by_pattern(&self, store: &PersistentStore, pattern: &Pattern) -> StoreResult<Vec<IdCode>> {
        let read = store.read_transaction();
        let rows: Vec<(String, String)> = read.scan_table(Table::UsrByName)?;
        Ok(rows
            .into_iter()
            .filter(|(name, _)| pattern.matches(name))
            .filter_map(|(_, usr)| usr.parse::<u64>().ok().map(IdCode))
            .collect())
    }

    /// Every USR of a symbol whose kind is `kind`, deduplicated across
    /// providers (a USR may appear once per provider that imports it, but
    /// its kind is the same everywhere by invariant 1 of §3).
    pub fn usrs_by_kind(&self, store: &PersistentStore, kind: SymbolKind) -> StoreResult<Vec<IdCode>> {
        let read = store.read_transaction();
        let rows: Vec<(String, ProviderRoleEntry)> = read.scan_table(Table::ProviderByUsr)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (key, entry) in rows {
            if entry.symbol.kind == kind && seen.insert(key) {
                out.push(entry.symbol.code());
            }
        }
        Ok(out)
    }

    /// Count of distinct canonical symbols of `kind` (§4.F), i.e. USRs of
    /// that kind for which at least one provider's aggregated roles satisfy
    /// the same declaration/definition rule `RecordReader` uses to mark an
    /// individual occurrence canonical.
    pub fn count_of_canonical_symbols_with_kind(&self, store: &PersistentStore, kind: SymbolKind) -> StoreResult<usize> {
        let read = store.read_transaction();
        let rows: Vec<(String, ProviderRoleEntry)> = read.scan_table(Table::ProviderByUsr)?;
        let prefers_declaration = crate::record_provider::prefers_declaration_as_canonical(kind);
        let required = if prefers_declaration { RoleSet::DECLARATION } else { RoleSet::DEFINITION };

        let mut canonical_usrs = HashSet::new();
        for (_, entry) in rows {
            if entry.symbol.kind == kind && entry.roles.contains(required) {
                canonical_usrs.insert(entry.symbol.code());
            }
        }
        Ok(canonical_usrs.len())
    }

    /// Dynamic-dispatch call resolution (§4.F).
    ///
    /// 1. Direct `Call` occurrences of `callee`.
    /// 2. If `callee` has no `Dynamic` role, stop there.
    /// 3. Compute the receiver-class set (resolving `Extension` members to
    ///    the type they extend).
    /// 4. If the first receiver class is a protocol, emit calls on every
    ///    transitive overrider.
    /// 5. Otherwise walk the base/override hierarchy, keeping only dynamic
    ///    calls whose receiver (if known) lands in the receiver-class set.
    #[allow(clippy::too_many_arguments)]
    pub fn for_each_symbol_call_occurrence(
        &self,
        store: &PersistentStore,
        library: &dyn crate::store_library::StoreLibrary,
        callee: &Symbol,
        callee_roles: RoleSet,
        visibility: &dyn ProviderVisibility,
        is_protocol: impl Fn(IdCode) -> bool,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> ImportResult<()> {
        let callee_code = callee.code();

        // Step 1: direct calls.
        let mut stopped = false;
        self.for_each_occurrence_by_usr(store, library, callee_code, RoleSet::CALL, visibility, |occ| {
            let result = receiver(occ);
            if result.should_stop() {
                stopped = true;
            }
            result
        })?;
        if stopped || !callee_roles.contains(RoleSet::DYNAMIC) {
            return Ok(());
        }

        // Step 3: receiver-class set.
        let graph = self.graph.lock().expect("relationship graph lock poisoned");
        let relation = if callee_roles.contains(RoleSet::CALL) {
            RelationKind::ReceivedBy
        } else {
            RelationKind::ChildOf
        };
        let mut receiver_classes: HashSet<IdCode> = graph.related(callee_code, relation).into_iter().collect();
        receiver_classes = receiver_classes
            .into_iter()
            .map(|class| {
                let extended = graph.related_by(class, RelationKind::ExtendedBy);
                extended.into_iter().next().unwrap_or(class)
            })
            .collect();

        let first_class = receiver_classes.iter().next().copied();
        if let Some(class) = first_class {
            if is_protocol(class) {
                // Step 4: protocol dispatch — every transitive overrider,
                // excluding the callee itself (already emitted in step 1).
                let overriders = graph.transitive_related_by(callee_code, RelationKind::OverrideOf);
                for overrider in overriders {
                    if overrider == callee_code {
                        continue;
                    }
                    self.for_each_occurrence_by_usr(store, library, overrider, RoleSet::CALL, visibility, |occ| receiver(occ))?;
                }
                return Ok(());
            }
        }

        // Step 5: base/override hierarchy walk, excluding the callee itself.
        let mut base_methods = graph.transitive_related_by(callee_code, RelationKind::OverrideOf);
        base_methods.extend(graph.transitive_related_by(callee_code, RelationKind::BaseOf));
        base_methods.remove(&callee_code);

        for base in base_methods {
            self.for_each_occurrence_by_usr(store, library, base, RoleSet::CALL, visibility, |occ| {
                if !occ.roles.contains(RoleSet::DYNAMIC) {
                    return VisitorResult::Continue;
                }
                let received_by: Vec<_> = occ
                    .relations
                    .iter()
                    .filter(|(roles, _)| roles.contains(RoleSet::RECEIVED_BY))
                    .collect();
                let accept = received_by.is_empty()
                    || received_by.iter().any(|(_, usr)| receiver_classes.contains(&usr.code()));
                if accept {
                    receiver(occ)
                } else {
                    VisitorResult::Continue
                }
            })?;
        }
        Ok(())
    }
}

impl Default for SymbolIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn store_err_to_import(err: crate::error::StoreError) -> crate::error::ImportError {
    crate::error::ImportError::RecordMalformed {
        name: "<store>".into(),
        reason: err.to_string(),
    }
}

/// Overlapping 3-character windows of `name`, the trigram index's key shape.
/// Names shorter than 3 characters are indexed whole.
fn trigrams(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() < 3 {
        return vec![name.to_string()];
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_library::{LocalStoreLibrary, OccurrenceDto, RecordFile, SymbolDto};
    use crate::types::Language;
    use std::fs;
    use tempfile::TempDir;

    fn write_record(dir: &TempDir, name: &str, symbols: Vec<SymbolDto>) {
        fs::create_dir_all(dir.path().join("records")).unwrap();
        let record = RecordFile { symbols };
        fs::write(
            dir.path().join(format!("records/{name}.record.json")),
            serde_json::to_vec(&record).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn import_then_lookup_by_usr_finds_declaration() {
        let dir = TempDir::new().unwrap();
        write_record(
            &dir,
            "a.o",
            vec![SymbolDto {
                usr: "c:@F@foo".into(),
                name: "foo".into(),
                kind: SymbolKind::Function,
                language: Language::C,
                is_unit_test: false,
                occurrences: vec![OccurrenceDto {
                    path: "a.c".into(),
                    line: 1,
                    column: 1,
                    module_name: "".into(),
                    is_system: false,
                    roles: RoleSet::DECLARATION | RoleSet::DEFINITION,
                    relations: vec![],
                }],
            }],
        );
        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let index = SymbolIndex::new();
        let provider = ProviderInfo::new("a.o");
        let reader = RecordReader::new(&library, "a.o");

        let mut tx = store.import_transaction();
        index.import_symbols(&mut tx, &provider, &reader).unwrap();
        tx.commit().unwrap();

        let usrs = index.usrs_by_name(&store, "foo").unwrap();
        assert_eq!(usrs.len(), 1);

        let mut found = false;
        index
            .for_each_occurrence_by_usr(&store, &library, usrs[0], RoleSet::DEFINITION, &AlwaysVisible, |_| {
                found = true;
                VisitorResult::Continue
            })
            .unwrap();
        assert!(found);
    }

    #[test]
    fn trigrams_of_short_name_is_whole_name() {
        assert_eq!(trigrams("ab"), vec!["ab".to_string()]);
        assert_eq!(trigrams("abcd"), vec!["abc".to_string(), "bcd".to_string()]);
    }

    /// A protocol method (kind prefers its declaration as canonical) with
    /// one provider holding only a declaration: canonical queries should
    /// yield that declaration even though no definition exists anywhere.
    #[test]
    fn canonical_occurrence_by_usr_falls_back_to_any_declaration_when_none_is_canonical() {
        let dir = TempDir::new().unwrap();
        write_record(
            &dir,
            "a.o",
            vec![SymbolDto {
                usr: "c:@P@run".into(),
                name: "run".into(),
                kind: SymbolKind::Protocol,
                language: Language::Cxx,
                is_unit_test: false,
                occurrences: vec![OccurrenceDto {
                    path: "a.h".into(),
                    line: 4,
                    column: 5,
                    module_name: "".into(),
                    is_system: false,
                    roles: RoleSet::DECLARATION,
                    relations: vec![],
                }],
            }],
        );
        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let index = SymbolIndex::new();
        let provider = ProviderInfo::new("a.o");
        let reader = RecordReader::new(&library, "a.o");
        let mut tx = store.import_transaction();
        index.import_symbols(&mut tx, &provider, &reader).unwrap();
        tx.commit().unwrap();

        let usr = index.usrs_by_name(&store, "run").unwrap()[0];
        let mut found = Vec::new();
        index
            .for_each_canonical_occurrence_by_usr(&store, &library, usr, &AlwaysVisible, |occ| {
                found.push(occ);
                VisitorResult::Continue
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].roles.contains(RoleSet::DECLARATION));
    }

    /// Two providers: one only declares, the other defines. Canonical
    /// queries must yield only the definition, never the bare declaration,
    /// once a canonical occurrence exists anywhere for the USR.
    #[test]
    fn canonical_occurrence_by_usr_prefers_definition_over_declaration_elsewhere() {
        let dir = TempDir::new().unwrap();
        write_record(
            &dir,
            "decl.o",
            vec![SymbolDto {
                usr: "c:@F@foo".into(),
                name: "foo".into(),
                kind: SymbolKind::Function,
                language: Language::C,
                is_unit_test: false,
                occurrences: vec![OccurrenceDto {
                    path: "foo.h".into(),
                    line: 1,
                    column: 1,
                    module_name: "".into(),
                    is_system: false,
                    roles: RoleSet::DECLARATION,
                    relations: vec![],
                }],
            }],
        );
        write_record(
            &dir,
            "def.o",
            vec![SymbolDto {
                usr: "c:@F@foo".into(),
                name: "foo".into(),
                kind: SymbolKind::Function,
                language: Language::C,
                is_unit_test: false,
                occurrences: vec![OccurrenceDto {
                    path: "foo.c".into(),
                    line: 10,
                    column: 1,
                    module_name: "".into(),
                    is_system: false,
                    roles: RoleSet::DECLARATION | RoleSet::DEFINITION,
                    relations: vec![],
                }],
            }],
        );
        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let index = SymbolIndex::new();
        let mut tx = store.import_transaction();
        for name in ["decl.o", "def.o"] {
            let provider = ProviderInfo::new(name);
            let reader = RecordReader::new(&library, name);
            index.import_symbols(&mut tx, &provider, &reader).unwrap();
        }
        tx.commit().unwrap();

        let usr = index.usrs_by_name(&store, "foo").unwrap()[0];
        let mut found = Vec::new();
        index
            .for_each_canonical_occurrence_by_usr(&store, &library, usr, &AlwaysVisible, |occ| {
                found.push(occ);
                VisitorResult::Continue
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].location.path.to_string_lossy(), "foo.c");
    }

    /// A provider row exists but its record file was never written: the
    /// query treats it as empty and counts it, instead of erroring out.
    #[test]
    fn missing_provider_record_is_counted_and_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        write_record(
            &dir,
            "present.o",
            vec![SymbolDto {
                usr: "c:@F@foo".into(),
                name: "foo".into(),
                kind: SymbolKind::Function,
                language: Language::C,
                is_unit_test: false,
                occurrences: vec![OccurrenceDto {
                    path: "a.c".into(),
                    line: 1,
                    column: 1,
                    module_name: "".into(),
                    is_system: false,
                    roles: RoleSet::DEFINITION,
                    relations: vec![],
                }],
            }],
        );
        let library = LocalStoreLibrary::new(dir.path());
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let index = SymbolIndex::new();
        let mut tx = store.import_transaction();
        let provider = ProviderInfo::new("present.o");
        let reader = RecordReader::new(&library, "present.o");
        index.import_symbols(&mut tx, &provider, &reader).unwrap();

        // A second provider row with no record file backing it at all.
        let ghost = ProviderInfo::new("ghost.o");
        let usr_key = IdCode::of("c:@F@foo").to_string();
        let entry = ProviderRoleEntry {
            provider_code: ghost.code.value(),
            provider_name: ghost.name.clone(),
            roles: RoleSet::DEFINITION,
            related_roles: RoleSet::empty(),
            symbol: Symbol::new("c:@F@foo", "foo", SymbolKind::Function, Language::C),
        };
        tx.append(Table::ProviderByUsr, &usr_key, &entry).unwrap();
        tx.put(Table::ProviderName, &ghost.code.to_string(), &ghost.name.to_string()).unwrap();
        tx.commit().unwrap();

        let usr = index.usrs_by_name(&store, "foo").unwrap()[0];
        let mut found = 0;
        index
            .for_each_occurrence_by_usr(&store, &library, usr, RoleSet::DEFINITION, &AlwaysVisible, |_| {
                found += 1;
                VisitorResult::Continue
            })
            .unwrap();
        assert_eq!(found, 1, "the readable provider's occurrence is still yielded");
        assert_eq!(index.missing_providers_looked_up(), 1);
    }

    #[test]
    fn count_unreferenced_providers_ignores_providers_still_named_by_a_unit() {
        let dir = TempDir::new().unwrap();
        let store = PersistentStore::open(dir.path().join("index"), 15_000_000).unwrap();
        let index = SymbolIndex::new();

        let mut tx = store.import_transaction();
        tx.put(Table::ProviderName, &IdCode::of("referenced.o").to_string(), &"referenced.o".to_string())
            .unwrap();
        tx.put(Table::ProviderName, &IdCode::of("orphan.o").to_string(), &"orphan.o".to_string()).unwrap();

        let unit = UnitInfo {
            name: crate::types::UnitName::new("U0"),
            mod_time: 0,
            main_file: None,
            out_file: None,
            target: "x86_64".into(),
            sysroot: None,
            is_system: false,
            symbol_provider_kind: crate::types::ProviderKind::Clang,
            has_test_symbols: false,
            provider_depends: vec![crate::unit::ProviderDependency {
                provider_name: "referenced.o".into(),
                file: "referenced.o".into(),
                module_name: "".into(),
                is_system: false,
            }],
            unit_depends: vec![],
            file_depends: vec![],
        };
        tx.put(Table::UnitInfo, "U0", &unit).unwrap();
        tx.commit().unwrap();

        assert_eq!(index.count_unreferenced_providers(&store).unwrap(), 1);
    }
}
