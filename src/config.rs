//! Configuration management for ZenView
//!
//! Provides persistent application settings with schema versioning and
//! migrations. Configuration is stored in `~/.zenview/config.json`. This is
//! the host-side configuration (site scope, indicator colours, policies); the
//! user's custom shortcut lives in the shared settings store instead.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Current config schema version
const CURRENT_VERSION: u32 = 2;

/// Global config instance for caching
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Where the feature applies
    pub site: SiteConfig,
    /// Page agent behaviour
    pub page: PageConfig,
    /// Per-tab badge appearance
    pub indicator: IndicatorConfig,
    /// Global accelerator binding
    pub accelerator: AcceleratorConfig,
    /// Shared settings store location
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            site: SiteConfig::default(),
            page: PageConfig::default(),
            indicator: IndicatorConfig::default(),
            accelerator: AcceleratorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Target site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Hostname fragment identifying the target site
    pub domain: String,
    /// Path of the canonical video-view page
    pub watch_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            domain: "youtube.com".to_string(),
            watch_path: "/watch".to_string(),
        }
    }
}

/// How a page agent treats an `updateShortcut` carrying an empty key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyShortcutPolicy {
    /// Keep the current shortcut and acknowledge with success
    #[default]
    Ignore,
    /// Keep the current shortcut and acknowledge with failure
    Reject,
}

/// Page agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Class applied to the page body while ZenView is on
    pub marker_class: String,
    /// Handling of empty-key shortcut updates
    pub empty_shortcut_policy: EmptyShortcutPolicy,
    /// Refuse shortcuts without any modifier at the page agent as well
    pub require_modifier: bool,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            marker_class: "youtube-zenview-extension".to_string(),
            empty_shortcut_policy: EmptyShortcutPolicy::default(),
            require_modifier: false,
        }
    }
}

/// Badge appearance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Badge text while ZenView is on
    pub on_text: String,
    /// Badge background while ZenView is on
    pub on_color: String,
    /// Badge background while ZenView is off
    pub off_color: String,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            on_text: "ON".to_string(),
            on_color: "#4285f4".to_string(),
            off_color: "#000000".to_string(),
        }
    }
}

/// Global accelerator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorConfig {
    /// Command name delivered by the host when the accelerator fires
    pub command: String,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            command: "toggle-fullscreen".to_string(),
        }
    }
}

/// Settings store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the settings file (None for ~/.zenview/storage.json)
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved settings file path
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| get_config_dir().join("storage.json"))
    }
}

/// Get the path to the config file (~/.zenview/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.zenview)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".zenview")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from a file, using defaults when it does not exist
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to a file, creating parent directories
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        0 => Ok(Config {
            version: 1,
            ..config
        }),
        // Version 1 -> 2: indicator colours became configurable; an empty
        // value left by hand-edited files falls back to the defaults
        1 => {
            let mut migrated = config;
            let defaults = IndicatorConfig::default();
            if migrated.indicator.on_color.is_empty() {
                migrated.indicator.on_color = defaults.on_color;
            }
            if migrated.indicator.off_color.is_empty() {
                migrated.indicator.off_color = defaults.off_color;
            }
            migrated.version = 2;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static Config {
    CONFIG.get_or_init(|| {
        let config = load_from(&get_config_path()).unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        tracing::info!("Config loaded: site={}", config.site.domain);
        config
    })
}

/// Get the current configuration (loaded from disk on first access)
pub fn get_config() -> Config {
    get_config_instance().clone()
}
