//! Named service container.
//!
//! A [`ServiceContainer`] is the composition seam between metadata and
//! concrete collaborators: consumers ask for a service by name and receive a
//! type-erased instance, without hard-coded references to the implementation.
//!
//! Definitions are either eager values or factory closures. A *shared*
//! definition memoizes the first produced instance for the lifetime of the
//! container; a *transient* definition constructs fresh on every resolution.
//! Factories receive the container itself and may resolve collaborators
//! re-entrantly — no internal lock is held during construction.

use crate::init::ParamBag;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Error type produced by failing service factories.
pub type ConstructionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Factory closure: receives the container (for collaborator resolution) and
/// the construction arguments of the triggering `get_with` call.
pub type ServiceFactory =
    Arc<dyn Fn(&ServiceContainer, &ParamBag) -> Result<ServiceInstance, ConstructionError> + Send + Sync>;

/// How a service is produced.
#[derive(Clone)]
pub enum ServiceDefinition {
    /// An eager value, returned as-is on every resolution.
    Value(ServiceInstance),
    /// A factory invoked to produce instances.
    Factory(ServiceFactory),
}

impl ServiceDefinition {
    /// Wrap a concrete value.
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// Wrap a factory closure producing a concrete type.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceContainer, &ParamBag) -> Result<T, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        Self::Factory(Arc::new(move |container, args| {
            factory(container, args).map(|v| Arc::new(v) as ServiceInstance)
        }))
    }
}

/// Errors surfaced by service resolution.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No definition registered under the requested name.
    #[error("service not found: '{name}'")]
    NotFound {
        /// The requested service name.
        name: String,
    },

    /// The definition raised during construction.
    #[error("service '{name}' failed to construct: {source}")]
    Construction {
        /// The service being constructed.
        name: String,
        /// The underlying factory error.
        #[source]
        source: ConstructionError,
    },

    /// The resolved instance does not have the requested type.
    #[error("service '{name}' is not of type {expected}")]
    WrongType {
        /// The requested service name.
        name: String,
        /// The requested Rust type.
        expected: &'static str,
    },
}

struct ServiceEntry {
    definition: ServiceDefinition,
    shared: bool,
    instance: Option<ServiceInstance>,
}

/// Minimal named-service registry with shared and transient lifetimes.
#[derive(Default)]
pub struct ServiceContainer {
    entries: Mutex<HashMap<String, ServiceEntry>>,
}

impl ServiceContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a definition named `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Register or overwrite a definition.
    ///
    /// Returns the previously registered definition, if any — callers can
    /// hold it to restore the registration later (cascading overrides).
    /// Overwriting discards any memoized instance of the old definition.
    pub fn set(
        &self,
        name: impl Into<String>,
        definition: ServiceDefinition,
        shared: bool,
    ) -> Option<ServiceDefinition> {
        self.entries
            .lock()
            .insert(
                name.into(),
                ServiceEntry {
                    definition,
                    shared,
                    instance: None,
                },
            )
            .map(|entry| entry.definition)
    }

    /// Register a shared eager value.
    pub fn set_value<T: Any + Send + Sync>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Option<ServiceDefinition> {
        self.set(name, ServiceDefinition::value(value), true)
    }

    /// Register a factory producing `T`.
    pub fn set_factory<T, F>(
        &self,
        name: impl Into<String>,
        shared: bool,
        factory: F,
    ) -> Option<ServiceDefinition>
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceContainer, &ParamBag) -> Result<T, ConstructionError>
            + Send
            + Sync
            + 'static,
    {
        self.set(name, ServiceDefinition::factory(factory), shared)
    }

    /// Resolve `name` with no construction arguments.
    pub fn get(&self, name: &str) -> Result<ServiceInstance, ServiceError> {
        self.get_with(name, &ParamBag::new())
    }

    /// Resolve `name`, passing `args` to the factory.
    ///
    /// For a shared definition the first produced instance is memoized and
    /// returned on every later call — later `args` are ignored. A transient
    /// definition invokes its factory fresh every call.
    pub fn get_with(&self, name: &str, args: &ParamBag) -> Result<ServiceInstance, ServiceError> {
        let (definition, shared) = {
            let entries = self.entries.lock();
            let entry = entries.get(name).ok_or_else(|| ServiceError::NotFound {
                name: name.to_string(),
            })?;
            if let Some(instance) = &entry.instance {
                return Ok(Arc::clone(instance));
            }
            (entry.definition.clone(), entry.shared)
        };

        // Construct outside the lock so factories can resolve collaborators.
        let instance = match definition {
            ServiceDefinition::Value(value) => value,
            ServiceDefinition::Factory(factory) => {
                factory(self, args).map_err(|source| ServiceError::Construction {
                    name: name.to_string(),
                    source,
                })?
            }
        };

        if shared {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(name) {
                // A racing resolution may have memoized first; preserve
                // reference identity by preferring the stored instance.
                if let Some(existing) = &entry.instance {
                    return Ok(Arc::clone(existing));
                }
                entry.instance = Some(Arc::clone(&instance));
            }
        }

        Ok(instance)
    }

    /// Resolve `name` and downcast to `Arc<T>`.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        self.get(name)?
            .downcast::<T>()
            .map_err(|_| ServiceError::WrongType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Resolve `name` and return a clone of the underlying `T`.
    pub fn get_cloned<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<T, ServiceError> {
        Ok((*self.get_as::<T>(name)?).clone())
    }
}
