//! Filesystem scan that builds a registry from file naming conventions.
//!
//! # Responsibility
//! - Walk a source tree and pick files named `<Stem><Suffix>.rs`.
//! - Derive registry keys and module-path implementation ids.
//!
//! # Invariants
//! - Walk order is lexicographic by path, so duplicate resolution is stable.
//! - A file whose stem is empty (the suffix file itself) is never registered.

use super::{strip_suffix_ignore_case, suffix_namespace, Registry, RegistryError, RegistryResult};
use log::{debug, info, warn};
use std::path::{Component, Path};
use std::time::Instant;
use walkdir::WalkDir;

/// Extension marker appended to suffixes that lack one.
pub const SOURCE_EXTENSION: &str = ".rs";

/// Separator between implementation-id segments.
pub const PATH_SEPARATOR: &str = "::";

/// Scans `root_dir` for files whose name ends with `name_suffix`.
///
/// `path_filter`, when non-empty, keeps only files whose directory path
/// (relative to `root_dir`) contains the filter as whole segments, e.g.
/// `"http/controllers"`.
///
/// # Errors
/// - `RootNotFound` when `root_dir` is missing or not a directory.
/// - `Walk` when a directory cannot be read during traversal.
pub fn scan(
    root_dir: impl AsRef<Path>,
    name_suffix: &str,
    path_filter: Option<&str>,
) -> RegistryResult<Registry> {
    let root = root_dir.as_ref();
    if !root.is_dir() {
        return Err(RegistryError::RootNotFound(root.to_path_buf()));
    }

    let started_at = Instant::now();
    let file_filter = file_name_filter(name_suffix);
    let namespace = suffix_namespace(name_suffix);
    let segment_filter = path_filter
        .map(|filter| filter.replace('\\', "/").trim_matches('/').to_string())
        .filter(|filter| !filter.is_empty())
        .map(|filter| format!("/{filter}/"));

    let mut registry = Registry::new();
    let mut duplicates = 0usize;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            debug!(
                "event=registry_scan module=registry status=skip reason=non_utf8 path={}",
                entry.path().display()
            );
            continue;
        };
        let Some(stem) = file_name.strip_suffix(file_filter.as_str()) else {
            continue;
        };
        if stem.is_empty() {
            continue;
        }

        let relative_dir = relative_segments(root, entry.path());
        if let Some(filter) = &segment_filter {
            if !format!("/{}/", relative_dir.join("/")).contains(filter.as_str()) {
                continue;
            }
        }

        let type_name =
            strip_suffix_ignore_case(file_name, SOURCE_EXTENSION).unwrap_or(file_name);
        let mut id_segments = relative_dir;
        id_segments.push(type_name.to_string());

        let key = format!("{}.{namespace}", stem.to_lowercase());
        let implementation_id = id_segments.join(PATH_SEPARATOR);
        if let Some(previous) = registry.insert(key.as_str(), implementation_id.as_str()) {
            duplicates += 1;
            warn!(
                "event=registry_scan module=registry status=duplicate_key key={} replaced={} by={}",
                key, previous, implementation_id
            );
        }
    }

    info!(
        "event=registry_scan module=registry status=ok suffix={} entries={} duplicates={} duration_ms={}",
        namespace,
        registry.len(),
        duplicates,
        started_at.elapsed().as_millis()
    );
    Ok(registry)
}

/// Normalizes the suffix to `<bare suffix>.rs`, whatever the case of a given extension.
fn file_name_filter(name_suffix: &str) -> String {
    let trimmed = name_suffix.trim();
    let bare = strip_suffix_ignore_case(trimmed, SOURCE_EXTENSION).unwrap_or(trimmed);
    format!("{bare}{SOURCE_EXTENSION}")
}

/// Directory segments of `path` relative to `root`, without the file name.
fn relative_segments(root: &Path, path: &Path) -> Vec<String> {
    path.parent()
        .and_then(|dir| dir.strip_prefix(root).ok())
        .map(|relative| {
            relative
                .components()
                .filter_map(|component| match component {
                    Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
