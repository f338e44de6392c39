//! Type discovery: explicit type declarations grouped into named collections.
//!
//! A [`TypeEntry`] is the declaration a handler type makes about itself:
//! which contracts it implements and how the container builds it. The typed
//! [`TypeBuilder`] only offers a contract when the compiler can prove the type
//! implements it, and records a monomorphised invoke function per contract.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use servhost_core::{AnyService, RequestHandler, TypeKey};
use tracing::debug;

use super::dispatch::{invoke_any_service, invoke_request_handler, InvokeFn};
use super::error::ScanError;
use crate::container::{Container, Factory, Instance};

// ---------------------------------------------------------------------------
// TypeEntry
// ---------------------------------------------------------------------------

/// Declared generic contract: the handler serves exactly `message_type`.
#[derive(Clone, Copy)]
pub(crate) struct RequestContract {
    pub(crate) message_type: TypeKey,
    pub(crate) response_type: TypeKey,
    pub(crate) invoke: InvokeFn,
}

/// Declared marker contract with its self-declared routes.
#[derive(Clone)]
pub(crate) struct ServiceContract {
    pub(crate) routes: Vec<TypeKey>,
    pub(crate) invoke: InvokeFn,
}

/// A type found in a collection, with whatever contracts it declares.
#[derive(Clone)]
pub struct TypeEntry {
    key: TypeKey,
    factory: Option<Factory>,
    pub(crate) request_contract: Option<RequestContract>,
    pub(crate) service_contract: Option<ServiceContract>,
}

impl TypeEntry {
    /// Starts a declaration for `T`.
    #[must_use]
    pub fn builder<T: Any + Send + Sync>() -> TypeBuilder<T> {
        TypeBuilder {
            entry: Self {
                key: TypeKey::of::<T>(),
                factory: None,
                request_contract: None,
                service_contract: None,
            },
            _type: PhantomData,
        }
    }

    /// A type that declares no handler contract (e.g. a message DTO).
    #[must_use]
    pub fn plain<T: Any + Send + Sync>() -> Self {
        Self::builder::<T>().build()
    }

    /// A `RequestHandler` built with `Default::default()`.
    #[must_use]
    pub fn handler<H: RequestHandler + Default>() -> Self {
        Self::builder::<H>()
            .request_handler()
            .default_factory()
            .build()
    }

    /// An `AnyService` built with `Default::default()`.
    #[must_use]
    pub fn service<S: AnyService + Default>() -> Self {
        Self::builder::<S>().any_service().default_factory().build()
    }

    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// True when the type declares at least one handler contract.
    #[must_use]
    pub fn declares_contract(&self) -> bool {
        self.request_contract.is_some() || self.service_contract.is_some()
    }

    /// Message type of the generic contract, if declared.
    #[must_use]
    pub fn message_type(&self) -> Option<TypeKey> {
        self.request_contract.map(|c| c.message_type)
    }

    pub(crate) fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }
}

impl fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEntry")
            .field("key", &self.key.name())
            .field("message_type", &self.message_type().map(|k| k.name()))
            .field("any_service", &self.service_contract.is_some())
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypeBuilder
// ---------------------------------------------------------------------------

/// Typed builder for a [`TypeEntry`].
pub struct TypeBuilder<T> {
    entry: TypeEntry,
    _type: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeBuilder<T> {
    /// Declares the generic `RequestHandler` contract.
    #[must_use]
    pub fn request_handler(mut self) -> Self
    where
        T: RequestHandler,
    {
        self.entry.request_contract = Some(RequestContract {
            message_type: TypeKey::of::<T::Request>(),
            response_type: TypeKey::of::<T::Response>(),
            invoke: invoke_request_handler::<T>,
        });
        self
    }

    /// Declares the `AnyService` marker contract with the routes from
    /// `AnyService::routes`.
    #[must_use]
    pub fn any_service(mut self) -> Self
    where
        T: AnyService,
    {
        self.entry.service_contract = Some(ServiceContract {
            routes: T::routes(),
            invoke: invoke_any_service::<T>,
        });
        self
    }

    /// Sets the factory the container uses to build `T`.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&dyn Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.entry.factory = Some(Arc::new(
            move |container: &dyn Container| -> anyhow::Result<Instance> {
                Ok(Arc::new(factory(container)?) as Instance)
            },
        ));
        self
    }

    /// Builds `T` with `Default::default()`.
    #[must_use]
    pub fn default_factory(self) -> Self
    where
        T: Default,
    {
        self.factory(|_| Ok(T::default()))
    }

    #[must_use]
    pub fn build(self) -> TypeEntry {
        self.entry
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// A named group of types, analogous to a loaded module.
pub trait TypeCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Enumerates the collection. An `Err` item aborts the scan.
    fn types(&self) -> Box<dyn Iterator<Item = anyhow::Result<TypeEntry>> + '_>;
}

/// In-memory collection of declared types.
#[derive(Debug, Clone)]
pub struct StaticCollection {
    name: String,
    entries: Vec<TypeEntry>,
}

impl StaticCollection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, entry: TypeEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: TypeEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TypeCollection for StaticCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn types(&self) -> Box<dyn Iterator<Item = anyhow::Result<TypeEntry>> + '_> {
        Box::new(self.entries.iter().cloned().map(Ok::<_, anyhow::Error>))
    }
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

/// Enumerates every collection in order.
///
/// # Errors
///
/// Stops at the first enumeration failure and returns a `ScanError` naming
/// the collection and the last type read from it.
pub fn scan(collections: &[Arc<dyn TypeCollection>]) -> Result<Vec<TypeEntry>, ScanError> {
    let mut found = Vec::new();

    for collection in collections {
        let mut last_type: Option<&'static str> = None;
        let before = found.len();

        for item in collection.types() {
            match item {
                Ok(entry) => {
                    last_type = Some(entry.key().name());
                    found.push(entry);
                }
                Err(source) => {
                    return Err(ScanError {
                        collection: collection.name().to_string(),
                        last_type: last_type.map(str::to_string),
                        source,
                    });
                }
            }
        }

        debug!(
            collection = collection.name(),
            types = found.len() - before,
            "scanned type collection"
        );
    }

    Ok(found)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use servhost_core::{Request, Response};

    use super::*;

    struct Ping;
    struct Pong;

    #[derive(Default)]
    struct PingHandler;

    #[async_trait]
    impl RequestHandler for PingHandler {
        type Request = Ping;
        type Response = Pong;

        async fn handle(&self, _request: Ping) -> anyhow::Result<Pong> {
            Ok(Pong)
        }
    }

    #[derive(Default)]
    struct Catalog;

    #[async_trait]
    impl AnyService for Catalog {
        fn routes() -> Vec<TypeKey> {
            vec![TypeKey::of::<Ping>()]
        }

        async fn any(&self, _request: Request) -> anyhow::Result<Response> {
            Ok(Response::new(()))
        }
    }

    /// Yields its entries, then fails.
    struct BrokenCollection {
        entries: Vec<TypeEntry>,
    }

    impl TypeCollection for BrokenCollection {
        fn name(&self) -> &str {
            "broken"
        }

        fn types(&self) -> Box<dyn Iterator<Item = anyhow::Result<TypeEntry>> + '_> {
            Box::new(
                self.entries
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(std::iter::once(Err(anyhow::anyhow!("unreadable type table")))),
            )
        }
    }

    #[test]
    fn handler_entry_declares_generic_contract() {
        let entry = TypeEntry::handler::<PingHandler>();
        assert_eq!(entry.key(), TypeKey::of::<PingHandler>());
        assert_eq!(entry.message_type(), Some(TypeKey::of::<Ping>()));
        assert!(entry.declares_contract());
        assert!(entry.factory().is_some());
    }

    #[test]
    fn service_entry_carries_routes() {
        let entry = TypeEntry::service::<Catalog>();
        assert_eq!(entry.message_type(), None);
        let contract = entry.service_contract.as_ref().unwrap();
        assert_eq!(contract.routes, vec![TypeKey::of::<Ping>()]);
    }

    #[test]
    fn plain_entry_declares_nothing() {
        let entry = TypeEntry::plain::<Ping>();
        assert!(!entry.declares_contract());
        assert!(entry.factory().is_none());
    }

    #[test]
    fn builder_factory_produces_instances() {
        let entry = TypeEntry::builder::<PingHandler>()
            .request_handler()
            .factory(|_| Ok(PingHandler))
            .build();
        let container = crate::container::FactoryContainer::new();
        let factory = entry.factory().unwrap();
        let instance = factory(&container as &dyn Container).unwrap();
        assert!(instance.downcast::<PingHandler>().is_ok());
    }

    #[test]
    fn scan_preserves_collection_order() {
        let first: Arc<dyn TypeCollection> = Arc::new(
            StaticCollection::new("first")
                .with(TypeEntry::plain::<Ping>())
                .with(TypeEntry::handler::<PingHandler>()),
        );
        let second: Arc<dyn TypeCollection> =
            Arc::new(StaticCollection::new("second").with(TypeEntry::service::<Catalog>()));

        let found = scan(&[first, second]).unwrap();
        let keys: Vec<TypeKey> = found.iter().map(TypeEntry::key).collect();
        assert_eq!(
            keys,
            vec![
                TypeKey::of::<Ping>(),
                TypeKey::of::<PingHandler>(),
                TypeKey::of::<Catalog>(),
            ]
        );
    }

    #[test]
    fn scan_failure_names_collection_and_last_type() {
        let ok: Arc<dyn TypeCollection> =
            Arc::new(StaticCollection::new("ok").with(TypeEntry::plain::<Pong>()));
        let broken: Arc<dyn TypeCollection> = Arc::new(BrokenCollection {
            entries: vec![TypeEntry::handler::<PingHandler>()],
        });

        let err = scan(&[ok, broken]).unwrap_err();
        assert_eq!(err.collection, "broken");
        assert_eq!(
            err.last_type.as_deref(),
            Some(TypeKey::of::<PingHandler>().name())
        );
        assert_eq!(err.source.to_string(), "unreadable type table");
    }

    #[test]
    fn scan_failure_on_first_item_has_no_last_type() {
        let broken: Arc<dyn TypeCollection> = Arc::new(BrokenCollection { entries: vec![] });
        let err = scan(&[broken]).unwrap_err();
        assert!(err.last_type.is_none());
    }
}
