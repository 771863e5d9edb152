//! Convention-based implementation discovery.
//!
//! # Responsibility
//! - Derive a key → implementation-id registry from source files on disk.
//! - Persist registries per suffix so later starts can skip the scan.
//!
//! # Invariants
//! - Keys are lowercase `<stem>.<suffix>`.
//! - Duplicate keys overwrite (last scanned wins) and are reported.
//! - Cache files are written once and never overwritten in place.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod cache;
mod discover;
pub mod scan;

pub use cache::{cache_path, invalidate, load, store, StoreOutcome};
pub use discover::{discover, DiscoverOptions, DiscoverySource, Discovery};
pub use scan::{scan, SOURCE_EXTENSION};

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Discovery and cache errors.
#[derive(Debug)]
pub enum RegistryError {
    /// The scan root does not exist.
    RootNotFound(PathBuf),
    Walk(walkdir::Error),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A cache file exists but cannot be trusted.
    MalformedCache { path: PathBuf, reason: String },
    /// The suffix cannot name a cache file (empty or contains a path separator).
    InvalidSuffix(String),
    Serialize(serde_json::Error),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootNotFound(path) => write!(f, "scan root not found: {}", path.display()),
            Self::Walk(err) => write!(f, "directory walk failed: {err}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::MalformedCache { path, reason } => {
                write!(f, "malformed registry cache {}: {reason}", path.display())
            }
            Self::Serialize(err) => write!(f, "failed to encode registry: {err}"),
            Self::InvalidSuffix(suffix) => write!(f, "invalid registry suffix `{suffix}`"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Walk(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
            Self::RootNotFound(_) | Self::MalformedCache { .. } | Self::InvalidSuffix(_) => None,
        }
    }
}

impl From<walkdir::Error> for RegistryError {
    fn from(value: walkdir::Error) -> Self {
        Self::Walk(value)
    }
}

/// One discovered implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub key: String,
    pub implementation_id: String,
}

/// Registry key → implementation id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one entry, returning the implementation id it replaced.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        implementation_id: impl Into<String>,
    ) -> Option<String> {
        self.entries.insert(key.into(), implementation_id.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, id)| (key.as_str(), id.as_str()))
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.iter()
            .map(|(key, implementation_id)| RegistryEntry {
                key: key.to_string(),
                implementation_id: implementation_id.to_string(),
            })
            .collect()
    }

    /// Adds every entry of `other`; its entries win on key collisions.
    pub fn merge(&mut self, other: Registry) {
        self.entries.extend(other.entries);
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub(crate) fn from_map(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl FromIterator<RegistryEntry> for Registry {
    fn from_iter<I: IntoIterator<Item = RegistryEntry>>(iter: I) -> Self {
        let mut registry = Registry::new();
        for entry in iter {
            registry.insert(entry.key, entry.implementation_id);
        }
        registry
    }
}

/// Strips the source extension from a user-supplied suffix and lowercases it.
///
/// `"Repository"` and `"Repository.rs"` both map to `"repository"`; this is
/// the namespace part of registry keys and the cache file stem.
pub(crate) fn suffix_namespace(name_suffix: &str) -> String {
    let trimmed = name_suffix.trim();
    let bare = strip_suffix_ignore_case(trimmed, SOURCE_EXTENSION).unwrap_or(trimmed);
    bare.to_lowercase()
}

/// Returns whether `name_suffix` maps to a plain file name under the cache directory.
pub fn is_valid_suffix(name_suffix: &str) -> bool {
    let namespace = suffix_namespace(name_suffix);
    !namespace.is_empty() && !namespace.contains(['/', '\\', '\0'])
}

pub(crate) fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = value.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}
