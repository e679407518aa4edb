//! Tantivy schema backing the abstract persistent store (4.C). Every named
//! table in the data model is one `doc_type` value sharing this schema;
//! `key` carries the table's primary key as a string (an [`IdCode`] is
//! hex-encoded, a plain name is used verbatim for trigram scans) and
//! `payload` carries the row's serialized value.

use tantivy::schema::{Schema, SchemaBuilder, Field, STORED, STRING, FAST};

#[derive(Debug, Clone)]
pub struct StoreSchema {
    pub doc_type: Field,
    pub key: Field,
    pub payload: Field,
}

impl StoreSchema {
    pub fn build() -> (Schema, StoreSchema) {
        let mut builder = SchemaBuilder::default();
        let doc_type = builder.add_text_field("doc_type", STRING | STORED | FAST);
        let key = builder.add_text_field("key", STRING | STORED | FAST);
        let payload = builder.add_bytes_field("payload", STORED);
        let schema = builder.build();
        (schema, StoreSchema { doc_type, key, payload })
    }
}

/// Table discriminators, one per named table in §4.C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    ProviderName,
    UnitInfo,
    ProviderByUsr,
    UnitsByFile,
    UsrByName,
    NameTrigramIndex,
    FilePathByCode,
    ModuleNameByCode,
    TargetByCode,
    DirByCode,
    ProvidersContainingTestSymbols,
    DependentUnitsOfUnit,
    UnitsContainingFile,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::ProviderName => "provider_name",
            Table::UnitInfo => "unit_info",
            Table::ProviderByUsr => "provider_by_usr",
            Table::UnitsByFile => "units_by_file",
            Table::UsrByName => "usr_by_name",
            Table::NameTrigramIndex => "name_trigram_index",
            Table::FilePathByCode => "file_path_by_code",
            Table::ModuleNameByCode => "module_name_by_code",
            Table::TargetByCode => "target_by_code",
            Table::DirByCode => "dir_by_code",
            Table::ProvidersContainingTestSymbols => "providers_containing_test_symbols",
            Table::DependentUnitsOfUnit => "dependent_units_of_unit",
            Table::UnitsContainingFile => "units_containing_file",
        }
    }
}
