//! Startup glue: logging, database, discovery and container in one call.
//!
//! # Responsibility
//! - Start file logging when a log directory is configured.
//! - Open the configured database and share it through one handle.
//! - Run cached discovery for every configured rule.
//! - Bind the discovered registries into a fresh container.
//!
//! # Invariants
//! - Rules are applied in configuration order; later rules win on key clashes.
//! - Construction stays lazy; no service is built here.

use crate::config::RepokitConfig;
use crate::container::{ContainerError, FactoryTable, ServiceContainer};
use crate::db::{DbError, SqliteHandle};
use crate::logging::{default_log_level, init_logging, LoggingError};
use crate::registry::{discover, Registry, RegistryError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

#[derive(Debug)]
pub enum BootstrapError {
    Logging(LoggingError),
    Db(DbError),
    Registry(RegistryError),
    Container(ContainerError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Container(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Container(err) => Some(err),
        }
    }
}

impl From<LoggingError> for BootstrapError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<DbError> for BootstrapError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RegistryError> for BootstrapError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<ContainerError> for BootstrapError {
    fn from(value: ContainerError) -> Self {
        Self::Container(value)
    }
}

/// Runs every configured discovery rule and merges the results.
pub fn discover_all(config: &RepokitConfig) -> Result<Registry, RegistryError> {
    let cache_dir = config.effective_cache_dir();
    let mut registry = Registry::new();
    for rule in &config.discovery {
        let discovery = discover(&rule.to_options(cache_dir))?;
        info!(
            "event=bootstrap_discover module=bootstrap status=ok suffix={} source={:?} entries={}",
            rule.suffix,
            discovery.source,
            discovery.registry.len()
        );
        registry.merge(discovery.registry);
    }
    Ok(registry)
}

/// Builds a ready container from `config` and the application's factories.
pub fn bootstrap(
    config: &RepokitConfig,
    factories: &FactoryTable,
) -> Result<ServiceContainer, BootstrapError> {
    if let Some(log_dir) = &config.log_dir {
        let level = config.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let started_at = Instant::now();
    let handle = match &config.database_path {
        Some(path) => SqliteHandle::open(path)?,
        None => SqliteHandle::open_in_memory()?,
    };

    let registry = discover_all(config)?;
    let mut container = ServiceContainer::new(handle.into_shared());
    container.bind_registry(&registry, factories)?;

    info!(
        "event=bootstrap module=bootstrap status=ok services={} duration_ms={}",
        registry.len(),
        started_at.elapsed().as_millis()
    );
    Ok(container)
}
