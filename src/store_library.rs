//! The record/unit store library boundary (§6, §10.Q). In production this
//! would be a dynamically-loaded native reader; `LocalStoreLibrary` is the
//! in-process reference implementation used throughout this crate and its
//! tests, reading the store's unit/record files directly as JSON.
//!
//! Keeping this behind a trait means a future dynamic-loading backend can
//! report "symbol not present on this host" for the optional entry points
//! without touching any call site.

use crate::error::{ImportError, ImportResult};
use crate::types::{Language, Location, ProviderKind, RoleSet, SymbolKind, UnitName};
use crate::unit::{ProviderDependency, UnitInfo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of a unit file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFile {
    pub mod_time: u64,
    pub main_file: Option<PathBuf>,
    pub out_file: Option<PathBuf>,
    pub target: String,
    pub sysroot: Option<PathBuf>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub symbol_provider_kind: ProviderKindDto,
    #[serde(default)]
    pub provider_depends: Vec<ProviderDependencyDto>,
    #[serde(default)]
    pub unit_depends: Vec<String>,
    #[serde(default)]
    pub file_depends: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum ProviderKindDto {
    #[default]
    Clang,
    Swift,
}

impl From<ProviderKindDto> for ProviderKind {
    fn from(value: ProviderKindDto) -> Self {
        match value {
            ProviderKindDto::Clang => ProviderKind::Clang,
            ProviderKindDto::Swift => ProviderKind::Swift,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDependencyDto {
    pub provider_name: String,
    pub file: PathBuf,
    #[serde(default)]
    pub module_name: String,
    #[serde(default)]
    pub is_system: bool,
}

/// On-disk shape of a record file: the symbols a provider declares, and
/// each symbol's occurrences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFile {
    pub symbols: Vec<SymbolDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDto {
    pub usr: String,
    pub name: String,
    pub kind: SymbolKind,
    pub language: Language,
    #[serde(default)]
    pub is_unit_test: bool,
    pub occurrences: Vec<OccurrenceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceDto {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub module_name: String,
    #[serde(default)]
    pub is_system: bool,
    pub roles: RoleSet,
    #[serde(default)]
    pub relations: Vec<(RoleSet, String)>,
}

/// Optional entry points that may be absent depending on the platform the
/// native reader was built for (§6).
pub trait StoreLibrary: Send + Sync {
    fn unit_mod_time(&self, unit: &UnitName) -> ImportResult<u64>;
    fn read_unit(&self, unit: &UnitName) -> ImportResult<UnitInfo>;
    fn read_record(&self, record_name: &str) -> ImportResult<RecordFile>;
    fn list_unit_names(&self) -> std::io::Result<Vec<UnitName>>;

    /// Derives a unit name from its compiler output path, when the native
    /// reader supports reverse lookup. Not every backend implements this.
    fn unit_name_from_output_path(&self, _output_path: &Path) -> Option<UnitName> {
        None
    }
}

pub struct LocalStoreLibrary {
    store_path: PathBuf,
}

impl LocalStoreLibrary {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self { store_path: store_path.into() }
    }

    fn unit_path(&self, unit: &UnitName) -> PathBuf {
        self.store_path.join("units").join(format!("{}.unit.json", unit.as_str()))
    }

    fn record_path(&self, record_name: &str) -> PathBuf {
        self.store_path.join("records").join(format!("{record_name}.record.json"))
    }
}

impl StoreLibrary for LocalStoreLibrary {
    fn unit_mod_time(&self, unit: &UnitName) -> ImportResult<u64> {
        let path = self.unit_path(unit);
        let metadata = std::fs::metadata(&path).map_err(|source| ImportError::UnitUnreadable {
            name: unit.clone(),
            source,
        })?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(mtime)
    }

    fn read_unit(&self, unit: &UnitName) -> ImportResult<UnitInfo> {
        let path = self.unit_path(unit);
        let contents = std::fs::read_to_string(&path).map_err(|source| ImportError::UnitUnreadable {
            name: unit.clone(),
            source,
        })?;
        let file: UnitFile = serde_json::from_str(&contents).map_err(|e| ImportError::UnitMalformed {
            name: unit.clone(),
            reason: e.to_string(),
        })?;

        Ok(UnitInfo {
            name: unit.clone(),
            mod_time: file.mod_time,
            main_file: file.main_file,
            out_file: file.out_file,
            target: file.target.into(),
            sysroot: file.sysroot,
            is_system: file.is_system,
            symbol_provider_kind: file.symbol_provider_kind.into(),
            has_test_symbols: false,
            provider_depends: file
                .provider_depends
                .into_iter()
                .map(|d| ProviderDependency {
                    provider_name: d.provider_name.into(),
                    file: d.file,
                    module_name: d.module_name.into(),
                    is_system: d.is_system,
                })
                .collect(),
            unit_depends: file.unit_depends.into_iter().map(UnitName::new).collect(),
            file_depends: file.file_depends,
        })
    }

    fn read_record(&self, record_name: &str) -> ImportResult<RecordFile> {
        let path = self.record_path(record_name);
        let mmap_source = std::fs::File::open(&path).map_err(|source| ImportError::RecordUnreadable {
            name: record_name.into(),
            source,
        })?;
        // SAFETY: record files are produced by a cooperating compiler and
        // are not concurrently truncated while the index holds this handle.
        let mmap = unsafe { memmap2::Mmap::map(&mmap_source) }.map_err(|source| ImportError::RecordUnreadable {
            name: record_name.into(),
            source,
        })?;
        serde_json::from_slice(&mmap).map_err(|e| ImportError::RecordMalformed {
            name: record_name.into(),
            reason: e.to_string(),
        })
    }

    fn list_unit_names(&self) -> std::io::Result<Vec<UnitName>> {
        let units_dir = self.store_path.join("units");
        if !units_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in ignore::WalkBuilder::new(&units_dir).hidden(false).git_ignore(false).build() {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let Some(file_name) = entry.path().file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".unit.json") {
                names.push(UnitName::new(stem.to_string()));
            }
        }
        Ok(names)
    }
}

pub fn location_from_dto(dto: &OccurrenceDto, unit_mod_time: u64) -> Location {
    Location {
        path: dto.path.clone(),
        line: dto.line,
        column: dto.column,
        module_name: dto.module_name.clone().into_boxed_str(),
        is_system: dto.is_system,
        unit_mod_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn reads_unit_file_written_as_json() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("units")).unwrap();
        fs::write(
            dir.path().join("units/U0.unit.json"),
            r#"{
                "mod_time": 100,
                "main_file": "a.c",
                "out_file": null,
                "target": "x86_64-apple-macosx",
                "sysroot": null,
                "is_system": false,
                "symbol_provider_kind": "Clang",
                "provider_depends": [],
                "unit_depends": [],
                "file_depends": ["a.c"]
            }"#,
        )
        .unwrap();

        let library = LocalStoreLibrary::new(dir.path());
        let unit = library.read_unit(&UnitName::new("U0")).unwrap();
        assert_eq!(unit.mod_time, 100);
        assert_eq!(unit.main_file, Some(PathBuf::from("a.c")));
    }

    #[test]
    fn list_unit_names_finds_all_unit_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("units")).unwrap();
        fs::write(dir.path().join("units/U0.unit.json"), "{}").unwrap();
        fs::write(dir.path().join("units/U1.unit.json"), "{}").unwrap();

        let library = LocalStoreLibrary::new(dir.path());
        let mut names: Vec<_> = library.list_unit_names().unwrap().into_iter().map(|n| n.0.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["U0".to_string(), "U1".to_string()]);
    }
}
