//! Convention-based repository wiring.
//!
//! Discovers implementation files by name suffix, caches the resulting
//! registry per suffix, and serves one lazily built singleton per registry
//! key from a container that shares a single database connection.

pub mod bootstrap;
pub mod config;
pub mod container;
pub mod db;
pub mod logging;
pub mod model;
pub mod registry;
pub mod repo;

pub use bootstrap::{bootstrap, discover_all, BootstrapError};
pub use config::{load_config, load_config_over, ConfigError, DiscoveryRule, RepokitConfig};
pub use container::{ContainerError, Factory, FactoryTable, Service, ServiceContainer};
pub use db::{ConnectionHandle, DbError, DbResult, SharedHandle, SqliteHandle};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::Record;
pub use rusqlite::types::Value;
pub use registry::{
    discover, scan, DiscoverOptions, Discovery, DiscoverySource, Registry, RegistryEntry,
    RegistryError, RegistryResult, StoreOutcome,
};
pub use repo::{
    FieldCriterion, Operator, RepoError, RepoResult, Repository, SortDirection, TableRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
