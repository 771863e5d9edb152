//! On-disk registry cache, one JSON document per suffix.
//!
//! # Responsibility
//! - Persist a scanned registry under `<cache_dir>/shares/<suffix>.json`.
//! - Load it back, rejecting anything that does not decode cleanly.
//!
//! # Invariants
//! - A cache file is never overwritten; concurrent writers race on an atomic
//!   no-clobber rename and exactly one document wins intact.
//! - A cache file that fails to decode is an error, never an empty registry.

use super::{is_valid_suffix, suffix_namespace, Registry, RegistryError, RegistryResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SHARES_DIR: &str = "shares";
const CACHE_EXTENSION: &str = "json";
const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheDocument {
    format: u32,
    suffix: String,
    entries: BTreeMap<String, String>,
}

/// Result of a cache write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// A cache file already existed and was left untouched.
    AlreadyPresent,
}

/// Returns the cache file location for one suffix.
///
/// # Errors
/// - `InvalidSuffix` when the suffix is empty or contains a path separator.
pub fn cache_path(cache_dir: impl AsRef<Path>, name_suffix: &str) -> RegistryResult<PathBuf> {
    if !is_valid_suffix(name_suffix) {
        return Err(RegistryError::InvalidSuffix(name_suffix.to_string()));
    }
    Ok(cache_dir
        .as_ref()
        .join(SHARES_DIR)
        .join(format!("{}.{CACHE_EXTENSION}", suffix_namespace(name_suffix))))
}

/// Loads the cached registry for `name_suffix`.
///
/// Returns `Ok(None)` when no cache file exists.
///
/// # Errors
/// - `MalformedCache` when the file is not a cache document for this suffix.
/// - `Io` when the file exists but cannot be read.
pub fn load(cache_dir: impl AsRef<Path>, name_suffix: &str) -> RegistryResult<Option<Registry>> {
    let path = cache_path(cache_dir, name_suffix)?;
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(RegistryError::Io { path, source }),
    };

    let document: CacheDocument =
        serde_json::from_str(&raw).map_err(|err| RegistryError::MalformedCache {
            path: path.clone(),
            reason: err.to_string(),
        })?;

    if document.format != CACHE_FORMAT_VERSION {
        return Err(RegistryError::MalformedCache {
            path,
            reason: format!(
                "unsupported format {} (expected {CACHE_FORMAT_VERSION})",
                document.format
            ),
        });
    }
    let expected_suffix = suffix_namespace(name_suffix);
    if document.suffix != expected_suffix {
        return Err(RegistryError::MalformedCache {
            path,
            reason: format!(
                "cached suffix `{}` does not match `{expected_suffix}`",
                document.suffix
            ),
        });
    }

    Ok(Some(Registry::from_map(document.entries)))
}

/// Writes `registry` as the cache for `name_suffix` unless one already exists.
///
/// Creates `<cache_dir>/shares` when missing. The document is fully written
/// to a temporary sibling file before being linked into place.
pub fn store(
    cache_dir: impl AsRef<Path>,
    name_suffix: &str,
    registry: &Registry,
) -> RegistryResult<StoreOutcome> {
    let path = cache_path(cache_dir, name_suffix)?;
    if path.exists() {
        return Ok(StoreOutcome::AlreadyPresent);
    }

    let shares = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(SHARES_DIR));
    std::fs::create_dir_all(&shares).map_err(|source| RegistryError::Io {
        path: shares.clone(),
        source,
    })?;

    let document = CacheDocument {
        format: CACHE_FORMAT_VERSION,
        suffix: suffix_namespace(name_suffix),
        entries: registry.as_map().clone(),
    };
    let io_error = |source: std::io::Error| RegistryError::Io {
        path: shares.clone(),
        source,
    };

    let mut staged = NamedTempFile::new_in(&shares).map_err(io_error)?;
    serde_json::to_writer_pretty(&mut staged, &document).map_err(RegistryError::Serialize)?;
    staged.write_all(b"\n").map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;

    match staged.persist_noclobber(&path) {
        Ok(_) => {
            info!(
                "event=registry_cache module=registry status=written suffix={} entries={}",
                document.suffix,
                registry.len()
            );
            Ok(StoreOutcome::Written)
        }
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            warn!(
                "event=registry_cache module=registry status=lost_race suffix={}",
                document.suffix
            );
            Ok(StoreOutcome::AlreadyPresent)
        }
        Err(err) => Err(RegistryError::Io {
            path,
            source: err.error,
        }),
    }
}

/// Removes the cache file for `name_suffix` so the next discovery rescans.
///
/// Returns whether a file was removed.
pub fn invalidate(cache_dir: impl AsRef<Path>, name_suffix: &str) -> RegistryResult<bool> {
    let path = cache_path(cache_dir, name_suffix)?;
    match std::fs::remove_file(&path) {
        Ok(()) => {
            info!(
                "event=registry_cache module=registry status=invalidated path={}",
                path.display()
            );
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(RegistryError::Io { path, source }),
    }
}
