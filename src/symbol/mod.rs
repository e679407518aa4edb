//! Symbol, occurrence and provider types imported from record files.

use crate::types::{IdCode, Language, Location, ProviderKind, RoleSet, SymbolKind, SymbolProperties, Usr};
use serde::{Deserialize, Serialize};

/// One declaration, immutable once imported. Identified by USR; a given USR
/// may be imported from several providers (e.g. a header included by many
/// translation units), in which case each import contributes occurrences
/// but the `Symbol` row itself is write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub usr: Usr,
    pub name: Box<str>,
    pub kind: SymbolKind,
    pub language: Language,
    pub properties: SymbolProperties,
}

impl Symbol {
    pub fn new(usr: impl Into<Usr>, name: impl Into<Box<str>>, kind: SymbolKind, language: Language) -> Self {
        Self {
            usr: usr.into(),
            name: name.into(),
            kind,
            language,
            properties: SymbolProperties::empty(),
        }
    }

    pub fn with_properties(mut self, properties: SymbolProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn code(&self) -> IdCode {
        self.usr.code()
    }

    /// Compiler-output normalisation applied at import time (4.F): a C++
    /// `Struct` is re-labelled `Class` so name/kind queries don't need to
    /// treat the two as distinct.
    pub fn normalize_kind(&mut self) {
        if self.language == Language::Cxx && self.kind == SymbolKind::Struct {
            self.kind = SymbolKind::Class;
        }
    }
}

/// One occurrence of a symbol at a location, with the roles it plays there
/// and any related symbols (relationship edges local to this occurrence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolOccurrence {
    pub usr: Usr,
    pub location: Location,
    pub roles: RoleSet,
    pub provider_kind: ProviderKind,
    pub relations: Vec<(RoleSet, Usr)>,
}

impl SymbolOccurrence {
    pub fn new(usr: impl Into<Usr>, location: Location, roles: RoleSet, provider_kind: ProviderKind) -> Self {
        Self {
            usr: usr.into(),
            location,
            roles,
            provider_kind,
            relations: Vec::new(),
        }
    }

    pub fn with_relation(mut self, roles: RoleSet, related: impl Into<Usr>) -> Self {
        self.relations.push((roles, related.into()));
        self
    }

    pub fn is_canonical(&self) -> bool {
        self.roles.contains(RoleSet::CANONICAL)
    }
}

/// A record file's metadata, as listed by the units that depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: Box<str>,
    pub code: IdCode,
    pub has_test_symbols: bool,
}

impl ProviderInfo {
    pub fn new(name: impl Into<Box<str>>) -> Self {
        let name = name.into();
        let code = IdCode::of(&name);
        Self {
            name,
            code,
            has_test_symbols: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_kind_rewrites_cxx_struct_to_class() {
        let mut symbol = Symbol::new("c:@S@Foo", "Foo", SymbolKind::Struct, Language::Cxx);
        symbol.normalize_kind();
        assert_eq!(symbol.kind, SymbolKind::Class);
    }

    #[test]
    fn normalize_kind_leaves_c_struct_alone() {
        let mut symbol = Symbol::new("c:@S@Foo", "Foo", SymbolKind::Struct, Language::C);
        symbol.normalize_kind();
        assert_eq!(symbol.kind, SymbolKind::Struct);
    }

    #[test]
    fn occurrence_is_canonical_tracks_canonical_bit() {
        let loc = Location::new("a.c".into(), 1, 1);
        let occ = SymbolOccurrence::new("c:@F@foo", loc, RoleSet::DEFINITION, ProviderKind::Clang);
        assert!(!occ.is_canonical());
        let occ = occ;
        let canonical = SymbolOccurrence {
            roles: occ.roles | RoleSet::CANONICAL,
            ..occ
        };
        assert!(canonical.is_canonical());
    }
}
