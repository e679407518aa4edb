//! Primitive identifiers and value types shared across the index.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A Unified Symbol Resolution string: an opaque, language-defined key that
/// identifies one declaration uniquely across the whole index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Usr(pub Box<str>);

impl Usr {
    pub fn new(s: impl Into<Box<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn code(&self) -> IdCode {
        IdCode::of(&self.0)
    }
}

impl std::fmt::Display for Usr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Usr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Usr {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Deterministic 64-bit primary key derived from a string. Collisions are
/// tolerated: every table that keys on [`IdCode`] also stores the source
/// string and verifies it on read (see `store::PersistentStore`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdCode(pub u64);

impl IdCode {
    pub fn of(s: &str) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(s.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(bytes))
    }

    pub fn of_path(path: &Path) -> Self {
        Self::of(&path.to_string_lossy())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for IdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A name for an on-disk unit file (unqualified, store-relative).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitName(pub Box<str>);

impl UnitName {
    pub fn new(s: impl Into<Box<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn code(&self) -> IdCode {
        IdCode::of(&self.0)
    }
}

impl std::fmt::Display for UnitName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A symbol's source-level category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Module,
    Namespace,
    Enum,
    EnumConstant,
    Struct,
    Class,
    Protocol,
    Extension,
    Typedef,
    TypeAlias,
    Function,
    Variable,
    Field,
    StaticMethod,
    InstanceMethod,
    ClassMethod,
    StaticProperty,
    InstanceProperty,
    ClassProperty,
    Constructor,
    Destructor,
    ConversionFunction,
    Parameter,
    Using,
    TemplateTypeParm,
    TemplateTemplateParm,
    TemplateNonTypeParm,
    Macro,
    CommentTag,
}

/// The compiler front-end that produced a given occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Clang,
    Swift,
}

/// Source language of a symbol's declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    C,
    ObjC,
    Cxx,
    Swift,
}

bitflags::bitflags! {
    /// Per-declaration properties, independent of any one occurrence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SymbolProperties: u16 {
        const UNIT_TEST           = 1 << 0;
        const GENERIC             = 1 << 1;
        const SWIFT_ASYNC         = 1 << 2;
        const PROTOCOL_INTERFACE  = 1 << 3;
        const LOCAL               = 1 << 4;
        const TEST_CANDIDATE      = 1 << 5;
    }
}

bitflags::bitflags! {
    /// Roles an occurrence plays at a given location. Combines the primary
    /// roles recorded by the compiler with relationship roles and an
    /// index-synthesised `CANONICAL` bit (see `record_provider::prefers_declaration_as_canonical`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RoleSet: u32 {
        const DECLARATION   = 1 << 0;
        const DEFINITION    = 1 << 1;
        const REFERENCE     = 1 << 2;
        const READ          = 1 << 3;
        const WRITE         = 1 << 4;
        const CALL          = 1 << 5;
        const DYNAMIC       = 1 << 6;
        const ADDRESS_OF    = 1 << 7;
        const IMPLICIT      = 1 << 8;
        const UNDEFINITION  = 1 << 9;

        const CHILD_OF         = 1 << 10;
        const BASE_OF           = 1 << 11;
        const OVERRIDE_OF       = 1 << 12;
        const RECEIVED_BY       = 1 << 13;
        const CALLED_BY         = 1 << 14;
        const EXTENDED_BY       = 1 << 15;
        const ACCESSOR_OF       = 1 << 16;
        const CONTAINED_BY      = 1 << 17;
        const IB_TYPE_OF        = 1 << 18;
        const SPECIALIZATION_OF = 1 << 19;

        const CANONICAL = 1 << 31;
    }
}

/// 1-based line/column location of an occurrence, as the compiler reports it
/// (UTF-8 column offsets, not byte offsets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub module_name: Box<str>,
    pub is_system: bool,
    /// Mod-time of the owning unit at the time this occurrence was imported.
    pub unit_mod_time: u64,
}

impl Location {
    pub fn new(path: PathBuf, line: u32, column: u32) -> Self {
        Self {
            path,
            line,
            column,
            module_name: "".into(),
            is_system: false,
            unit_mod_time: 0,
        }
    }
}

/// Result of a visitor callback: whether enumeration should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorResult {
    Continue,
    Stop,
}

impl VisitorResult {
    pub fn should_stop(self) -> bool {
        matches!(self, VisitorResult::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_code_is_deterministic() {
        assert_eq!(IdCode::of("c:@F@foo"), IdCode::of("c:@F@foo"));
        assert_ne!(IdCode::of("c:@F@foo"), IdCode::of("c:@F@bar"));
    }

    #[test]
    fn usr_code_round_trips_through_display() {
        let usr = Usr::new("c:@F@foo");
        assert_eq!(usr.to_string(), "c:@F@foo");
        assert_eq!(usr.code(), IdCode::of("c:@F@foo"));
    }

    #[test]
    fn role_set_combines_primary_and_relationship_bits() {
        let roles = RoleSet::DEFINITION | RoleSet::CANONICAL;
        assert!(roles.contains(RoleSet::DEFINITION));
        assert!(roles.contains(RoleSet::CANONICAL));
        assert!(!roles.contains(RoleSet::DECLARATION));
    }
}
