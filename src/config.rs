/// Daemon configuration loader - parses vizhomerseklet.toml
///
/// Every key is optional; a missing file means "all defaults", which is
/// the normal way to run against the public API.
///
/// ```toml
/// [api]
/// url = "https://api.omw.hu/water_temp_hu.php"
/// timeout_secs = 10
///
/// [coordinator]
/// update_interval_minutes = 30
///
/// [storage]
/// path = ".storage/config_entries.json"
///
/// [endpoint]
/// port = 8080
/// ```

use crate::model::{API_URL, REQUEST_TIMEOUT, UPDATE_INTERVAL};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "vizhomerseklet.toml";

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "VIZHOMERSEKLET_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub api: ApiSettings,
    pub coordinator: CoordinatorSettings,
    pub storage: StorageSettings,
    pub endpoint: EndpointSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSettings {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: API_URL.to_string(),
            timeout_secs: REQUEST_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorSettings {
    pub update_interval_minutes: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            update_interval_minutes: UPDATE_INTERVAL.as_secs() / 60,
        }
    }
}

/// Where the host keeps config-entry records. Unset keeps them in memory
/// only, so the config flow runs on every start.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSettings {
    pub port: Option<u16>,
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.coordinator.update_interval_minutes * 60)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.api.url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.url must not be empty".to_string()));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be positive".to_string()));
        }
        if self.coordinator.update_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.update_interval_minutes must be positive".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Explicit path wins, then `VIZHOMERSEKLET_CONFIG`, then the default
/// file name in the working directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Parses and validates settings from TOML text.
pub fn parse_settings(contents: &str, origin: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: origin.to_path_buf(),
        source: e,
    })?;
    settings.validate()
}

/// Loads settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let settings = parse_settings(&contents, path)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(settings)
}
