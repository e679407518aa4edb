//! Layered configuration: defaults, then a TOML file, then environment
//! variables (`SYMBINDEX_` prefix, `__` separating nested keys).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Read-only directory the compiler writes unit/record files into.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Private directory the index's own database lives in.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub visibility: VisibilityConfig,

    /// `(from, to)` path prefix rewrites applied on import and on query.
    #[serde(default)]
    pub prefix_mappings: Vec<(PathBuf, PathBuf)>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Initial tantivy writer arena budget, in bytes.
    #[serde(default = "default_initial_map_size")]
    pub initial_map_size: usize,

    /// Maximum number of `MapFull` doublings before giving up (§4.C, §7).
    #[serde(default = "default_max_map_doublings")]
    pub max_map_doublings: u32,

    /// Events processed per scheduler batch (§4.J).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VisibilityConfig {
    /// Legacy main-file visibility vs. explicit-output-file visibility
    /// (§4.E). Matches `use_explicit_output_units` from §6.
    #[serde(default = "default_false")]
    pub use_explicit_output_units: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,

    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_store_path() -> PathBuf {
    PathBuf::from(".symbindex/store")
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".symbindex/index")
}
fn default_initial_map_size() -> usize {
    64 * 1024 * 1024
}
fn default_max_map_doublings() -> u32 {
    6
}
fn default_batch_size() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_debounce_ms() -> u64 {
    250
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            store_path: default_store_path(),
            index_path: default_index_path(),
            store: StoreConfig::default(),
            watch: WatchConfig::default(),
            visibility: VisibilityConfig::default(),
            prefix_mappings: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_map_size: default_initial_map_size(),
            max_map_doublings: default_max_map_doublings(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            use_explicit_output_units: default_false(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, searching upward from the
    /// current directory for a `.symbindex` workspace.
    pub fn load() -> Result<Self, figment::Error> {
        let config_path =
            Self::find_workspace_config().unwrap_or_else(|| PathBuf::from(".symbindex/settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(
                Env::prefixed("SYMBINDEX_").map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(
                Env::prefixed("SYMBINDEX_").map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
    }

    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".symbindex");
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }
        None
    }

    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(".symbindex").is_dir())
            .map(Path::to_path_buf)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".symbindex/settings.toml");
        if !force && config_path.exists() {
            return Err("configuration file already exists; use --force to overwrite".into());
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
