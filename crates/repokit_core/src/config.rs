//! JSON configuration for discovery, caching, storage and logging.
//!
//! # Responsibility
//! - Describe where to scan, where to cache, and which database to open.
//! - Layer a settings file over an existing configuration.
//!
//! # Invariants
//! - A missing settings file is not an error (`Ok(None)`).
//! - A present but undecodable file is always an error.
//! - Only fields present in a layer override the base configuration.

use crate::registry::{is_valid_suffix, DiscoverOptions};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DEFAULT_CACHE_DIR: &str = "app/cache";

/// One `scan(root_dir, suffix, path_filter)` rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryRule {
    pub root_dir: PathBuf,
    /// File name suffix, e.g. `Repository`.
    pub suffix: String,
    #[serde(default)]
    pub path_filter: Option<String>,
}

impl DiscoveryRule {
    pub fn new(root_dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            suffix: suffix.into(),
            path_filter: None,
        }
    }

    /// Builds discovery options, caching under `cache_dir` when given.
    pub fn to_options(&self, cache_dir: Option<&Path>) -> DiscoverOptions {
        let mut options = DiscoverOptions::new(&self.root_dir, &self.suffix);
        options.path_filter = self.path_filter.clone();
        options.cache_dir = cache_dir.map(Path::to_path_buf);
        options
    }
}

/// Effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepokitConfig {
    /// SQLite file; `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub use_cache: bool,
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files; `None` leaves logging off.
    pub log_dir: Option<PathBuf>,
    pub discovery: Vec<DiscoveryRule>,
}

impl Default for RepokitConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            use_cache: true,
            log_level: None,
            log_dir: None,
            discovery: Vec::new(),
        }
    }
}

impl RepokitConfig {
    /// Returns the cache directory when caching is enabled.
    pub fn effective_cache_dir(&self) -> Option<&Path> {
        self.use_cache.then_some(self.cache_dir.as_path())
    }

    /// Checks rule-level invariants not expressible in the file format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.discovery.iter().enumerate() {
            if rule.suffix.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "discovery[{index}].suffix cannot be empty"
                )));
            }
            if !is_valid_suffix(&rule.suffix) {
                return Err(ConfigError::Invalid(format!(
                    "discovery[{index}].suffix `{}` cannot contain path separators",
                    rule.suffix
                )));
            }
            if rule.root_dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "discovery[{index}].root_dir cannot be empty"
                )));
            }
        }
        if let Some(log_dir) = &self.log_dir {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Partial configuration as read from one settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub database_path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub use_cache: Option<bool>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub discovery: Option<Vec<DiscoveryRule>>,
}

impl ConfigLayer {
    /// Overrides `base` with every field set in this layer.
    pub fn apply(self, mut base: RepokitConfig) -> RepokitConfig {
        if let Some(value) = self.database_path {
            base.database_path = Some(value);
        }
        if let Some(value) = self.cache_dir {
            base.cache_dir = value;
        }
        if let Some(value) = self.use_cache {
            base.use_cache = value;
        }
        if let Some(value) = self.log_level {
            base.log_level = Some(value);
        }
        if let Some(value) = self.log_dir {
            base.log_dir = Some(value);
        }
        if let Some(value) = self.discovery {
            base.discovery = value;
        }
        base
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "invalid settings file {}: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Reads one settings layer. Returns `Ok(None)` when the file does not exist.
pub fn load_layer(path: impl AsRef<Path>) -> Result<Option<ConfigLayer>, ConfigError> {
    let path = path.as_ref();
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let layer = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(layer))
}

/// Loads a settings file over defaults. Returns `Ok(None)` when it does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Option<RepokitConfig>, ConfigError> {
    load_config_over(path, RepokitConfig::default()).map(|(config, found)| found.then_some(config))
}

/// Layers a settings file over `existing`.
///
/// Returns the merged configuration and whether the file was found; a
/// missing file leaves `existing` unchanged.
pub fn load_config_over(
    path: impl AsRef<Path>,
    existing: RepokitConfig,
) -> Result<(RepokitConfig, bool), ConfigError> {
    let Some(layer) = load_layer(path)? else {
        return Ok((existing, false));
    };
    let merged = layer.apply(existing);
    merged.validate()?;
    Ok((merged, true))
}
