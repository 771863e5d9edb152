//! Service container wiring discovered registries to typed factories.
//!
//! # Responsibility
//! - Map each registry key to the factory registered for its implementation id.
//! - Construct one singleton per key on first lookup and reuse it afterwards.
//!
//! # Invariants
//! - Repository factories receive the shared connection handle.
//! - Container factories receive the container and may resolve other keys.
//! - A factory runs at most once per key, even under concurrent lookups.
//! - A key requested again while its own factory runs is a dependency cycle
//!   and fails with `DependencyCycle` instead of blocking.
//! - The container owns the connection handle; services only hold clones.

use crate::db::SharedHandle;
use crate::registry::Registry;
use log::{debug, info};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

/// Type-erased singleton stored by the container.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Construction rule for one implementation.
#[derive(Clone, Copy)]
pub enum Factory {
    /// Built from the shared connection handle (repositories).
    WithConnection(fn(SharedHandle) -> Service),
    /// Built from the container itself (controllers and other composites).
    ///
    /// Resolving a key that is already under construction on the same
    /// thread returns `ContainerError::DependencyCycle`.
    WithContainer(fn(&ServiceContainer) -> Result<Service, ContainerError>),
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithConnection(_) => f.write_str("Factory::WithConnection"),
            Self::WithContainer(_) => f.write_str("Factory::WithContainer"),
        }
    }
}

/// Implementation id → factory, populated by the application at startup.
#[derive(Debug, Clone, Default)]
pub struct FactoryTable {
    factories: BTreeMap<String, Factory>,
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, implementation_id: impl Into<String>, factory: Factory) {
        self.factories.insert(implementation_id.into(), factory);
    }

    /// Builder-style registration of a repository factory.
    pub fn with_repository(
        mut self,
        implementation_id: impl Into<String>,
        factory: fn(SharedHandle) -> Service,
    ) -> Self {
        self.register(implementation_id, Factory::WithConnection(factory));
        self
    }

    /// Builder-style registration of a factory that resolves its own dependencies.
    pub fn with_composite(
        mut self,
        implementation_id: impl Into<String>,
        factory: fn(&ServiceContainer) -> Result<Service, ContainerError>,
    ) -> Self {
        self.register(implementation_id, Factory::WithContainer(factory));
        self
    }

    pub fn get(&self, implementation_id: &str) -> Option<Factory> {
        self.factories.get(implementation_id).copied()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Container wiring and lookup errors.
#[derive(Debug)]
pub enum ContainerError {
    /// A registry entry names an implementation with no registered factory.
    MissingFactory {
        key: String,
        implementation_id: String,
    },
    UnknownKey(String),
    /// The singleton exists but is not of the requested type.
    TypeMismatch {
        key: String,
        expected: &'static str,
    },
    /// The key was requested again while its own factory was running.
    DependencyCycle(String),
    /// A factory could not build its service.
    Construction {
        key: String,
        source: Box<dyn Error + Send + Sync>,
    },
}

impl ContainerError {
    /// Wraps a factory failure for `key`.
    pub fn construction(
        key: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Construction {
            key: key.into(),
            source: source.into(),
        }
    }
}

impl Display for ContainerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFactory {
                key,
                implementation_id,
            } => write!(
                f,
                "no factory registered for `{implementation_id}` (registry key `{key}`)"
            ),
            Self::UnknownKey(key) => write!(f, "no service registered under `{key}`"),
            Self::TypeMismatch { key, expected } => {
                write!(f, "service `{key}` is not a `{expected}`")
            }
            Self::DependencyCycle(key) => {
                write!(f, "dependency cycle while constructing service `{key}`")
            }
            Self::Construction { key, source } => {
                write!(f, "failed to construct service `{key}`: {source}")
            }
        }
    }
}

impl Error for ContainerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Construction { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

struct Binding {
    implementation_id: String,
    factory: Factory,
    instance: OnceCell<Service>,
    /// Thread currently running this binding's factory.
    builder: Mutex<Option<ThreadId>>,
}

impl Binding {
    fn builder(&self) -> Option<ThreadId> {
        *self.builder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_builder(&self, builder: Option<ThreadId>) {
        *self.builder.lock().unwrap_or_else(PoisonError::into_inner) = builder;
    }
}

/// Clears the builder mark when construction ends, including on error.
struct BuildMark<'a>(&'a Binding);

impl<'a> BuildMark<'a> {
    fn new(binding: &'a Binding) -> Self {
        binding.set_builder(Some(thread::current().id()));
        Self(binding)
    }
}

impl Drop for BuildMark<'_> {
    fn drop(&mut self) {
        self.0.set_builder(None);
    }
}

/// Lazily constructed singletons keyed by registry key.
pub struct ServiceContainer {
    handle: SharedHandle,
    bindings: BTreeMap<String, Binding>,
}

impl ServiceContainer {
    pub fn new(handle: SharedHandle) -> Self {
        Self {
            handle,
            bindings: BTreeMap::new(),
        }
    }

    /// Returns the connection handle shared with every repository.
    pub fn handle(&self) -> &SharedHandle {
        &self.handle
    }

    /// Binds every registry entry to its factory.
    ///
    /// Rebinding an existing key replaces it and drops any built instance.
    ///
    /// # Errors
    /// - `MissingFactory` for the first entry without a factory; entries
    ///   before it stay bound.
    pub fn bind_registry(
        &mut self,
        registry: &Registry,
        factories: &FactoryTable,
    ) -> Result<(), ContainerError> {
        for (key, implementation_id) in registry.iter() {
            let factory = factories.get(implementation_id).ok_or_else(|| {
                ContainerError::MissingFactory {
                    key: key.to_string(),
                    implementation_id: implementation_id.to_string(),
                }
            })?;
            self.bind(key, implementation_id, factory);
        }
        info!(
            "event=container_bind module=container status=ok entries={} total={}",
            registry.len(),
            self.bindings.len()
        );
        Ok(())
    }

    /// Binds one key directly, bypassing discovery.
    pub fn bind(
        &mut self,
        key: impl Into<String>,
        implementation_id: impl Into<String>,
        factory: Factory,
    ) {
        self.bindings.insert(
            key.into(),
            Binding {
                implementation_id: implementation_id.into(),
                factory,
                instance: OnceCell::new(),
                builder: Mutex::new(None),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    /// Returns bound keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn implementation_id(&self, key: &str) -> Option<&str> {
        self.bindings
            .get(key)
            .map(|binding| binding.implementation_id.as_str())
    }

    /// Returns whether the singleton for `key` has been constructed.
    pub fn is_built(&self, key: &str) -> bool {
        self.bindings
            .get(key)
            .is_some_and(|binding| binding.instance.get().is_some())
    }

    /// Returns the singleton for `key`, constructing it on first use.
    pub fn get(&self, key: &str) -> Result<Service, ContainerError> {
        let binding = self
            .bindings
            .get(key)
            .ok_or_else(|| ContainerError::UnknownKey(key.to_string()))?;

        if let Some(service) = binding.instance.get() {
            return Ok(Arc::clone(service));
        }
        if binding.builder() == Some(thread::current().id()) {
            return Err(ContainerError::DependencyCycle(key.to_string()));
        }

        let service = binding.instance.get_or_try_init(|| {
            let _mark = BuildMark::new(binding);
            debug!(
                "event=container_build module=container status=start key={} implementation={}",
                key, binding.implementation_id
            );
            match binding.factory {
                Factory::WithConnection(build) => Ok(build(Arc::clone(&self.handle))),
                Factory::WithContainer(build) => build(self),
            }
        })?;

        Ok(Arc::clone(service))
    }

    /// Returns the singleton for `key` downcast to `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ContainerError> {
        self.get(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                key: key.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("keys", &self.bindings.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
