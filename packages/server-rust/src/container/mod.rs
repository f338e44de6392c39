//! Dependency container capability.
//!
//! The service manager only needs four operations from a container:
//! register a type with a factory and lifecycle, register a pre-built
//! singleton, resolve by type, and dispose. [`FactoryContainer`] is the
//! bundled implementation; any other DI mechanism can sit behind the trait.

pub mod factory;

use std::any::Any;
use std::sync::Arc;

use servhost_core::{Lifecycle, TypeKey};

pub use factory::FactoryContainer;

/// A resolved, type-erased instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Builds a new instance. Receives the container so it can resolve its own
/// dependencies.
pub type Factory = Arc<dyn Fn(&dyn Container) -> anyhow::Result<Instance> + Send + Sync>;

/// Errors returned by container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("type {type_name} is not registered with the container")]
    NotRegistered { type_name: &'static str },
    #[error("failed to construct {type_name}: {source}")]
    Construction {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("container resolved {type_name} to an instance of a different type")]
    WrongInstanceType { type_name: &'static str },
    #[error("container has been disposed")]
    Disposed,
}

/// Register-by-type / resolve-by-type capability.
pub trait Container: Send + Sync {
    /// Binds `ty` to `factory` under `lifecycle`. Rebinding a type replaces
    /// its previous binding.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::Disposed` after `dispose`.
    fn register_type(
        &self,
        ty: TypeKey,
        factory: Factory,
        lifecycle: Lifecycle,
    ) -> Result<(), ContainerError>;

    /// Binds `ty` to a fixed instance returned by every `resolve`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::Disposed` after `dispose`.
    fn register_singleton_instance(
        &self,
        ty: TypeKey,
        instance: Instance,
    ) -> Result<(), ContainerError>;

    /// Resolves an instance of `ty`.
    ///
    /// # Errors
    ///
    /// Returns `NotRegistered` for unknown types, `Construction` when the
    /// factory fails, and `Disposed` after `dispose`.
    fn resolve(&self, ty: TypeKey) -> Result<Instance, ContainerError>;

    fn is_registered(&self, ty: TypeKey) -> bool;

    /// Releases every binding and cached instance.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::Disposed` if already disposed.
    fn dispose(&self) -> Result<(), ContainerError>;
}

impl dyn Container + '_ {
    /// Resolves `T` and downcasts the instance.
    ///
    /// # Errors
    ///
    /// Propagates `resolve` failures and returns `WrongInstanceType` when the
    /// binding produced something other than a `T`.
    pub fn resolve_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ContainerError> {
        let key = TypeKey::of::<T>();
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::WrongInstanceType {
                type_name: key.name(),
            })
    }
}
