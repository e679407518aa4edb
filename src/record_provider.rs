//! Record Provider (4.D): lazily opens one provider's record file and
//! exposes predicate-driven enumeration over its symbols and occurrences.
//! Backed by a memory-mapped read through [`StoreLibrary`], matching the
//! grounding codebase's file-reading idiom for large immutable inputs.

use crate::store_library::{location_from_dto, RecordFile, StoreLibrary};
use crate::symbol::{ProviderInfo, Symbol, SymbolOccurrence};
use crate::types::{IdCode, Language, ProviderKind, RoleSet, SymbolKind, VisitorResult};
use std::collections::HashSet;
use std::sync::OnceLock;

/// One symbol's aggregated roles across every occurrence in this record,
/// used by `SymbolIndex::import_symbols` to populate `provider_by_usr`.
#[derive(Debug, Clone)]
pub struct CoreSymbol {
    pub symbol: Symbol,
    pub roles: RoleSet,
    pub related_roles: RoleSet,
}

/// Kinds for which the best-representative occurrence is the declaration
/// rather than the definition (forward-declarable / interface-only kinds).
pub(crate) fn prefers_declaration_as_canonical(kind: SymbolKind) -> bool {
    matches!(
        kind,
        SymbolKind::Protocol | SymbolKind::Typedef | SymbolKind::TypeAlias | SymbolKind::Using
    )
}

pub struct RecordReader<'a> {
    library: &'a dyn StoreLibrary,
    record_name: Box<str>,
    record: OnceLock<RecordFile>,
}

impl<'a> RecordReader<'a> {
    pub fn new(library: &'a dyn StoreLibrary, record_name: impl Into<Box<str>>) -> Self {
        Self {
            library,
            record_name: record_name.into(),
            record: OnceLock::new(),
        }
    }

    pub fn provider_info(&self) -> crate::error::ImportResult<ProviderInfo> {
        Ok(ProviderInfo::new(self.record_name.clone()))
    }

    fn record(&self) -> crate::error::ImportResult<&RecordFile> {
        if let Some(record) = self.record.get() {
            return Ok(record);
        }
        let record = self.library.read_record(&self.record_name)?;
        Ok(self.record.get_or_init(|| record))
    }

    /// Walks every symbol once, deduplicating occurrences of the same USR
    /// within this record by OR-ing their roles and related-roles together.
    pub fn for_each_core_symbol(
        &self,
        mut receiver: impl FnMut(CoreSymbol) -> VisitorResult,
    ) -> crate::error::ImportResult<()> {
        let record = self.record()?;
        for dto in &record.symbols {
            let mut symbol = Symbol::new(dto.usr.as_str(), dto.name.as_str(), dto.kind, dto.language);
            if dto.is_unit_test {
                symbol = symbol.with_properties(crate::types::SymbolProperties::UNIT_TEST);
            }
            symbol.normalize_kind();

            let mut roles = RoleSet::empty();
            let mut related_roles = RoleSet::empty();
            for occurrence in &dto.occurrences {
                roles |= occurrence.roles;
                for (relation_roles, _) in &occurrence.relations {
                    related_roles |= *relation_roles;
                }
            }

            let core = CoreSymbol { symbol, roles, related_roles };
            if receiver(core).should_stop() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Occurrences whose symbol is among `usr_codes` and whose roles
    /// intersect `required_roles`. A synthesised `Canonical` bit is added
    /// per the kind-dependent rule in §4.D.
    pub fn for_each_occurrence_by_usr(
        &self,
        usr_codes: &HashSet<IdCode>,
        required_roles: RoleSet,
        unit_mod_time: u64,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> crate::error::ImportResult<()> {
        let record = self.record()?;
        for dto in &record.symbols {
            let usr_code = IdCode::of(&dto.usr);
            if !usr_codes.contains(&usr_code) {
                continue;
            }
            let prefers_declaration = prefers_declaration_as_canonical(dto.kind);
            for occurrence in &dto.occurrences {
                if !occurrence.roles.intersects(required_roles) {
                    continue;
                }
                if self.emit_occurrence(dto, occurrence, prefers_declaration, unit_mod_time, &mut receiver) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Same as [`RecordReader::for_each_occurrence_by_usr`] but filters on
    /// the occurrence's *related* symbols instead of its own.
    pub fn for_each_occurrence_by_related_usr(
        &self,
        usr_codes: &HashSet<IdCode>,
        required_roles: RoleSet,
        unit_mod_time: u64,
        mut receiver: impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> crate::error::ImportResult<()> {
        let record = self.record()?;
        for dto in &record.symbols {
            let prefers_declaration = prefers_declaration_as_canonical(dto.kind);
            for occurrence in &dto.occurrences {
                if !occurrence.roles.intersects(required_roles) {
                    continue;
                }
                let related_match = occurrence
                    .relations
                    .iter()
                    .any(|(_, related_usr)| usr_codes.contains(&IdCode::of(related_usr)));
                if !related_match {
                    continue;
                }
                if self.emit_occurrence(dto, occurrence, prefers_declaration, unit_mod_time, &mut receiver) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if the receiver asked enumeration to stop.
    fn emit_occurrence(
        &self,
        dto: &crate::store_library::SymbolDto,
        occurrence: &crate::store_library::OccurrenceDto,
        prefers_declaration: bool,
        unit_mod_time: u64,
        receiver: &mut impl FnMut(SymbolOccurrence) -> VisitorResult,
    ) -> bool {
        let is_canonical = if prefers_declaration {
            occurrence.roles.contains(RoleSet::DECLARATION)
        } else {
            occurrence.roles.contains(RoleSet::DEFINITION)
        };
        let mut roles = occurrence.roles;
        if is_canonical {
            roles |= RoleSet::CANONICAL;
        }

        let provider_kind = match dto.language {
            Language::Swift => ProviderKind::Swift,
            Language::C | Language::ObjC | Language::Cxx => ProviderKind::Clang,
        };
        let mut out = SymbolOccurrence::new(dto.usr.as_str(), location_from_dto(occurrence, unit_mod_time), roles, provider_kind);
        for (relation_roles, related_usr) in &occurrence.relations {
            out = out.with_relation(*relation_roles, related_usr.as_str());
        }
        receiver(out).should_stop()
    }

    /// Emits every relationship edge recorded on any occurrence in this
    /// record, as `(from, kind, to)` triples, for rebuilding the in-memory
    /// [`crate::relationship::RelationshipGraph`] during import.
    pub fn for_each_relationship(
        &self,
        mut receiver: impl FnMut(IdCode, crate::relationship::RelationKind, IdCode),
    ) -> crate::error::ImportResult<()> {
        let record = self.record()?;
        for dto in &record.symbols {
            let from = IdCode::of(&dto.usr);
            for occurrence in &dto.occurrences {
                for (relation_roles, related_usr) in &occurrence.relations {
                    let to = IdCode::of(related_usr);
                    for kind in crate::relationship::RelationKind::from_role_bits(*relation_roles) {
                        receiver(from, kind, to);
                    }
                }
            }
        }
        Ok(())
    }
}
