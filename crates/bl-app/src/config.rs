//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use bl_core::StatsConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Storage key the timeline is persisted under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "babylog:timeline:v1";

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Key of the persisted timeline snapshot.
    pub storage_key: String,
    /// Statistics tunables.
    pub stats: StatsConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("storage_key", &self.storage_key)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("babylog.db"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            stats: StatsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (BL_*, nested with BL_STATS__TREND_DAYS)
        figment = figment.merge(Env::prefixed("BL_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for the baby log.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("babylog"))
}

/// Returns the platform-specific data directory for the baby log.
///
/// On Linux: `~/.local/share/babylog`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("babylog"))
}
