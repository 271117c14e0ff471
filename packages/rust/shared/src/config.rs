//! Application configuration for viewsync.
//!
//! User config lives at `~/.viewsync/viewsync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewSyncError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "viewsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".viewsync";

// ---------------------------------------------------------------------------
// Config structs (matching viewsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reconciliation behavior.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Destination store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Upstream source settings for the bundled fragments.
    #[serde(default)]
    pub sources: SourcesConfig,
}

/// What to do when one fragment fails during a full document build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPolicy {
    /// Abort the whole build; the stored document is left untouched.
    #[default]
    FailFast,
    /// Omit the failing fragments and write what succeeded.
    BestEffort,
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Full-build failure policy.
    #[serde(default)]
    pub build_policy: BuildPolicy,

    /// Maximum documents reconciled concurrently per message (0 = unbounded).
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            build_policy: BuildPolicy::default(),
            max_concurrent_documents: default_max_concurrent_documents(),
        }
    }
}

fn default_max_concurrent_documents() -> usize {
    8
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "var/viewsync.db".into()
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// JSON file holding the upstream tables read by the bundled fragments.
    #[serde(default = "default_sources_path")]
    pub path: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            path: default_sources_path(),
        }
    }
}

fn default_sources_path() -> String {
    "fixtures/json/sources.fixture.json".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.viewsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ViewSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.viewsync/viewsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ViewSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ViewSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ViewSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| ViewSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ViewSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
