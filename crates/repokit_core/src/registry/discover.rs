//! Cached discovery: consult the cache, fall back to a scan, store the result.

use super::{cache, scan, Registry, RegistryError, RegistryResult};
use log::warn;
use std::path::PathBuf;

/// Inputs for one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverOptions {
    pub root_dir: PathBuf,
    pub name_suffix: String,
    pub path_filter: Option<String>,
    /// Cache directory; `None` disables caching entirely.
    pub cache_dir: Option<PathBuf>,
}

impl DiscoverOptions {
    pub fn new(root_dir: impl Into<PathBuf>, name_suffix: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            name_suffix: name_suffix.into(),
            path_filter: None,
            cache_dir: None,
        }
    }

    pub fn with_path_filter(mut self, path_filter: impl Into<String>) -> Self {
        self.path_filter = Some(path_filter.into());
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }
}

/// Where a discovered registry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    Cache,
    Scan,
    /// The scan root was missing; the registry is empty and was not cached.
    MissingRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub registry: Registry,
    pub source: DiscoverySource,
}

/// Returns the registry for `options`, scanning only when no usable cache exists.
///
/// # Recovery
/// - A malformed cache file is reported, removed, and replaced by a fresh scan.
/// - An unreadable or unwritable cache degrades to scanning without caching.
/// - A missing scan root yields an empty registry.
///
/// # Errors
/// - Propagates directory walk failures from the scan itself.
pub fn discover(options: &DiscoverOptions) -> RegistryResult<Discovery> {
    let suffix = options.name_suffix.as_str();

    if let Some(cache_dir) = &options.cache_dir {
        match cache::load(cache_dir, suffix) {
            Ok(Some(registry)) => {
                return Ok(Discovery {
                    registry,
                    source: DiscoverySource::Cache,
                })
            }
            Ok(None) => {}
            Err(err @ RegistryError::MalformedCache { .. }) => {
                warn!(
                    "event=registry_discover module=registry status=cache_rejected error={}",
                    err
                );
                if let Err(remove_err) = cache::invalidate(cache_dir, suffix) {
                    warn!(
                        "event=registry_discover module=registry status=cache_remove_failed error={}",
                        remove_err
                    );
                }
            }
            Err(err) => {
                warn!(
                    "event=registry_discover module=registry status=cache_unreadable error={}",
                    err
                );
            }
        }
    }

    let registry = match scan(
        &options.root_dir,
        suffix,
        options.path_filter.as_deref(),
    ) {
        Ok(registry) => registry,
        Err(err @ RegistryError::RootNotFound(_)) => {
            warn!(
                "event=registry_discover module=registry status=missing_root error={}",
                err
            );
            return Ok(Discovery {
                registry: Registry::new(),
                source: DiscoverySource::MissingRoot,
            });
        }
        Err(err) => return Err(err),
    };

    if let Some(cache_dir) = &options.cache_dir {
        if let Err(err) = cache::store(cache_dir, suffix, &registry) {
            warn!(
                "event=registry_discover module=registry status=cache_store_failed error={}",
                err
            );
        }
    }

    Ok(Discovery {
        registry,
        source: DiscoverySource::Scan,
    })
}
