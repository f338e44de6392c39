//! Hand-rolled factory-map container.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use servhost_core::{Lifecycle, TypeKey};
use tracing::debug;

use super::{Container, ContainerError, Factory, Instance};

enum Binding {
    PerCall(Factory),
    /// Built on first resolve, then cached. A shared type whose factory
    /// resolves itself deadlocks.
    Shared {
        factory: Factory,
        instance: Mutex<Option<Instance>>,
    },
    Instance(Instance),
}

/// Container backed by a concurrent map from type to factory.
///
/// Resolution clones the binding out of the map before running a factory, so
/// factories may resolve their own dependencies from the same container.
pub struct FactoryContainer {
    bindings: DashMap<TypeKey, Arc<Binding>>,
    disposed: AtomicBool,
}

impl FactoryContainer {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of bound types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn ensure_live(&self) -> Result<(), ContainerError> {
        if self.disposed.load(Ordering::Acquire) {
            Err(ContainerError::Disposed)
        } else {
            Ok(())
        }
    }

    fn bind(&self, ty: TypeKey, binding: Binding) -> Result<(), ContainerError> {
        self.ensure_live()?;
        if self.bindings.insert(ty, Arc::new(binding)).is_some() {
            debug!(type_name = ty.name(), "replaced container binding");
        }
        Ok(())
    }

    fn construct(&self, ty: TypeKey, factory: &Factory) -> Result<Instance, ContainerError> {
        factory(self).map_err(|source| ContainerError::Construction {
            type_name: ty.name(),
            source,
        })
    }
}

impl Default for FactoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Container for FactoryContainer {
    fn register_type(
        &self,
        ty: TypeKey,
        factory: Factory,
        lifecycle: Lifecycle,
    ) -> Result<(), ContainerError> {
        let binding = match lifecycle {
            Lifecycle::PerCall => Binding::PerCall(factory),
            Lifecycle::Shared => Binding::Shared {
                factory,
                instance: Mutex::new(None),
            },
        };
        self.bind(ty, binding)
    }

    fn register_singleton_instance(
        &self,
        ty: TypeKey,
        instance: Instance,
    ) -> Result<(), ContainerError> {
        self.bind(ty, Binding::Instance(instance))
    }

    fn resolve(&self, ty: TypeKey) -> Result<Instance, ContainerError> {
        self.ensure_live()?;
        let binding = self
            .bindings
            .get(&ty)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ContainerError::NotRegistered {
                type_name: ty.name(),
            })?;

        match binding.as_ref() {
            Binding::Instance(instance) => Ok(Arc::clone(instance)),
            Binding::PerCall(factory) => self.construct(ty, factory),
            Binding::Shared { factory, instance } => {
                let mut slot = instance.lock();
                if let Some(existing) = slot.as_ref() {
                    return Ok(Arc::clone(existing));
                }
                let created = self.construct(ty, factory)?;
                *slot = Some(Arc::clone(&created));
                Ok(created)
            }
        }
    }

    fn is_registered(&self, ty: TypeKey) -> bool {
        self.bindings.contains_key(&ty)
    }

    fn dispose(&self) -> Result<(), ContainerError> {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ContainerError::Disposed);
        }
        let released = self.bindings.len();
        self.bindings.clear();
        debug!(released, "container disposed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    struct Clock {
        tick: u32,
    }

    struct Repo {
        clock: Arc<Clock>,
    }

    fn counting_factory(counter: Arc<AtomicU32>) -> Factory {
        Arc::new(move |_c: &dyn Container| -> anyhow::Result<Instance> {
            let tick = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Clock { tick }) as Instance)
        })
    }

    #[test]
    fn per_call_builds_fresh_instances() {
        let container = FactoryContainer::new();
        let counter = Arc::new(AtomicU32::new(0));
        container
            .register_type(
                TypeKey::of::<Clock>(),
                counting_factory(counter.clone()),
                Lifecycle::PerCall,
            )
            .unwrap();

        let dyn_container: &dyn Container = &container;
        let a = dyn_container.resolve_as::<Clock>().unwrap();
        let b = dyn_container.resolve_as::<Clock>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!((a.tick, b.tick), (0, 1));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_builds_once() {
        let container = FactoryContainer::new();
        let counter = Arc::new(AtomicU32::new(0));
        container
            .register_type(
                TypeKey::of::<Clock>(),
                counting_factory(counter.clone()),
                Lifecycle::Shared,
            )
            .unwrap();

        let a = container.resolve(TypeKey::of::<Clock>()).unwrap();
        let b = container.resolve(TypeKey::of::<Clock>()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singleton_instance_is_returned_as_is() {
        let container = FactoryContainer::new();
        let clock = Arc::new(Clock { tick: 9 });
        container
            .register_singleton_instance(TypeKey::of::<Clock>(), clock.clone())
            .unwrap();

        let dyn_container: &dyn Container = &container;
        let resolved = dyn_container.resolve_as::<Clock>().unwrap();
        assert!(Arc::ptr_eq(&resolved, &clock));
    }

    #[test]
    fn factories_resolve_dependencies() {
        let container = FactoryContainer::new();
        container
            .register_singleton_instance(TypeKey::of::<Clock>(), Arc::new(Clock { tick: 3 }))
            .unwrap();
        container
            .register_type(
                TypeKey::of::<Repo>(),
                Arc::new(|c: &dyn Container| -> anyhow::Result<Instance> {
                    let clock = c.resolve_as::<Clock>()?;
                    Ok(Arc::new(Repo { clock }) as Instance)
                }),
                Lifecycle::PerCall,
            )
            .unwrap();

        let dyn_container: &dyn Container = &container;
        let repo = dyn_container.resolve_as::<Repo>().unwrap();
        assert_eq!(repo.clock.tick, 3);
    }

    #[test]
    fn unknown_type_is_not_registered() {
        let container = FactoryContainer::new();
        let err = container.resolve(TypeKey::of::<Clock>()).unwrap_err();
        assert!(matches!(err, ContainerError::NotRegistered { type_name } if type_name.ends_with("Clock")));
        assert!(!container.is_registered(TypeKey::of::<Clock>()));
    }

    #[test]
    fn factory_failure_keeps_source() {
        let container = FactoryContainer::new();
        container
            .register_type(
                TypeKey::of::<Clock>(),
                Arc::new(|_c: &dyn Container| -> anyhow::Result<Instance> {
                    Err(anyhow::anyhow!("clock offline"))
                }),
                Lifecycle::PerCall,
            )
            .unwrap();

        let err = container.resolve(TypeKey::of::<Clock>()).unwrap_err();
        assert!(err.to_string().contains("clock offline"));
        assert!(matches!(err, ContainerError::Construction { .. }));
    }

    #[test]
    fn wrong_instance_type_is_reported() {
        let container = FactoryContainer::new();
        container
            .register_singleton_instance(TypeKey::of::<Clock>(), Arc::new(5_u32))
            .unwrap();
        let dyn_container: &dyn Container = &container;
        assert!(matches!(
            dyn_container.resolve_as::<Clock>(),
            Err(ContainerError::WrongInstanceType { .. })
        ));
    }

    #[test]
    fn rebinding_replaces_previous_binding() {
        let container = FactoryContainer::new();
        let key = TypeKey::of::<Clock>();
        container
            .register_singleton_instance(key, Arc::new(Clock { tick: 1 }))
            .unwrap();
        container
            .register_singleton_instance(key, Arc::new(Clock { tick: 2 }))
            .unwrap();

        let dyn_container: &dyn Container = &container;
        assert_eq!(dyn_container.resolve_as::<Clock>().unwrap().tick, 2);
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn dispose_rejects_further_use() {
        let container = FactoryContainer::new();
        container
            .register_singleton_instance(TypeKey::of::<Clock>(), Arc::new(Clock { tick: 0 }))
            .unwrap();

        container.dispose().unwrap();
        assert!(container.is_empty());
        assert!(matches!(
            container.resolve(TypeKey::of::<Clock>()),
            Err(ContainerError::Disposed)
        ));
        assert!(matches!(
            container.register_singleton_instance(TypeKey::of::<Clock>(), Arc::new(Clock { tick: 0 })),
            Err(ContainerError::Disposed)
        ));
        assert!(matches!(container.dispose(), Err(ContainerError::Disposed)));
    }
}
