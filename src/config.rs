use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::CodecConfig;
use crate::coordinator::CoordinatorConfig;
use crate::CoordinatorError;

pub const DEFAULT_CONFIG_FILE: &str = "fragment-store.toml";
pub const CONFIG_ENV_VAR: &str = "FRAGMENT_STORE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; fragments land in `<root>/objects`, records in `<root>/metadata`.
    pub root: PathBuf,
    pub cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage"),
            cache_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Unreferenced fragments younger than this are left for in-flight ingests.
    pub orphan_grace_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            orphan_grace_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub codec: CodecConfig,
    pub coordinator: CoordinatorConfig,
    pub maintenance: MaintenanceConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, CoordinatorError> {
        let config: Config = toml::from_str(text)
            .map_err(|e| CoordinatorError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, or returns the defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "loaded configuration");
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(CoordinatorError::Configuration(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Resolves the config path: explicit argument, then environment, then the default file.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        self.coordinator.validate()?;
        if self.storage.cache_capacity == 0 {
            return Err(CoordinatorError::Configuration(
                "storage.cache_capacity must be at least 1".into(),
            ));
        }
        if self.codec.timeout_seconds == 0 {
            return Err(CoordinatorError::Configuration(
                "codec.timeout_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
