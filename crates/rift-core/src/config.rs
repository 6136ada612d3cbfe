//! `rift.toml` configuration with environment overrides

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CAPACITY;
use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "rift.toml";
pub const STORE_DIR_ENV: &str = "RIFT_STORE_DIR";
pub const CACHE_CAPACITY_ENV: &str = "RIFT_DERIVATION_CACHE";

const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RiftConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub derivation: DerivationConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Files above this size degrade to a bare `File` node.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Worker threads for parsing; 0 uses the rayon default.
    #[serde(default)]
    pub threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".rift")
}

impl RiftConfig {
    /// Load `rift.toml` from `root`, falling back to defaults when absent.
    /// Environment overrides are applied on top.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = root.as_ref().join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from a variable lookup. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(STORE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.store.dir = PathBuf::from(dir.trim());
        }
        if let Some(raw) = lookup(CACHE_CAPACITY_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(capacity) => self.derivation.cache_capacity = capacity,
                Err(_) => tracing::warn!("Ignoring invalid {}={}", CACHE_CAPACITY_ENV, raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = RiftConfig::from_file(&dir.path().join(CONFIG_FILE_NAME));
        assert!(matches!(config, Err(ConfigError::Io { .. })));

        let defaults = RiftConfig::default();
        assert_eq!(defaults.analysis.max_file_bytes, 1024 * 1024);
        assert_eq!(defaults.derivation.cache_capacity, 64);
        assert_eq!(defaults.store.dir, PathBuf::from(".rift"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[analysis]\nthreads = 2\n").unwrap();

        let config = RiftConfig::from_file(&path).unwrap();
        assert_eq!(config.analysis.threads, 2);
        assert_eq!(config.analysis.max_file_bytes, 1024 * 1024);
        assert_eq!(config.derivation, DerivationConfig::default());
    }

    #[test]
    fn invalid_toml_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[analysis\n").unwrap();
        assert!(matches!(RiftConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([(STORE_DIR_ENV, "/tmp/rift"), (CACHE_CAPACITY_ENV, "8")]);
        let mut config = RiftConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.store.dir, PathBuf::from("/tmp/rift"));
        assert_eq!(config.derivation.cache_capacity, 8);

        config.apply_env(|key| (key == CACHE_CAPACITY_ENV).then(|| "lots".to_string()));
        assert_eq!(config.derivation.cache_capacity, 8);
    }
}
