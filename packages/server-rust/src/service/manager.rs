//! Service manager: discovers handler types, registers them with the
//! container and metadata registry, and executes requests.
//!
//! Lifecycle: `new()` -> `init()` -> (`register_*`, `execute`)* -> `dispose()`.
//! `init` runs once, single-threaded, at startup. After that `execute` may be
//! called concurrently from any number of tasks. Callers must drain in-flight
//! requests (see `drain`) before calling `dispose`.

use std::any::Any;
use std::fmt;
use std::future::ready;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use servhost_core::{Lifecycle, Request, Response, TypeKey};
use tracing::{debug, error, info, warn};

use super::classify::{classify, HandlerVariant};
use super::config::HostConfig;
use super::dispatch::{DispatchFuture, Invoker, InvokerCache};
use super::error::{ManagerState, RegistrationError, ServiceError};
use super::metadata::ServiceMetadata;
use super::scan::{scan, TypeBuilder, TypeCollection, TypeEntry};
use crate::container::Container;

/// Orchestrates discovery, registration and dispatch for one service host.
pub struct ServiceManager {
    config: Arc<HostConfig>,
    container: Arc<dyn Container>,
    collections: Vec<Arc<dyn TypeCollection>>,
    metadata: Arc<ServiceMetadata>,
    invokers: InvokerCache,
    state: ArcSwap<ManagerState>,
    in_flight: Arc<AtomicU64>,
}

impl ServiceManager {
    /// Creates an uninitialized manager over `container`.
    #[must_use]
    pub fn new(config: HostConfig, container: Arc<dyn Container>) -> Self {
        let metadata = Arc::new(ServiceMetadata::new());
        Self {
            config: Arc::new(config),
            container,
            collections: Vec::new(),
            invokers: InvokerCache::new(Arc::clone(&metadata)),
            metadata,
            state: ArcSwap::from_pointee(ManagerState::Uninitialized),
            in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Adds a type collection to scan during `init`.
    #[must_use]
    pub fn with_collection(mut self, collection: impl TypeCollection + 'static) -> Self {
        self.collections.push(Arc::new(collection));
        self
    }

    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The host's single metadata registry.
    #[must_use]
    pub fn metadata(&self) -> Arc<ServiceMetadata> {
        Arc::clone(&self.metadata)
    }

    #[must_use]
    pub fn invokers(&self) -> &InvokerCache {
        &self.invokers
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        **self.state.load()
    }

    /// Number of `execute` calls currently running.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: ManagerState) {
        self.state.store(Arc::new(state));
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), ServiceError> {
        match self.state() {
            ManagerState::Ready => Ok(()),
            ManagerState::Disposed => Err(ServiceError::Disposed),
            actual => Err(ServiceError::InvalidState {
                expected: ManagerState::Ready,
                actual,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Initialization and registration
    // -----------------------------------------------------------------------

    /// Scans every collection, classifies each declared handler type and
    /// registers it under the configured default lifecycle.
    ///
    /// Types that declare no handler contract are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless the manager is uninitialized. Any scan,
    /// classification, registration or container failure aborts `init` and
    /// leaves the manager `Faulted`.
    pub fn init(&self) -> Result<&Self, ServiceError> {
        let actual = self.state();
        if actual != ManagerState::Uninitialized {
            return Err(ServiceError::InvalidState {
                expected: ManagerState::Uninitialized,
                actual,
            });
        }
        self.set_state(ManagerState::Initializing);

        match self.populate() {
            Ok(registered) => {
                self.set_state(ManagerState::Ready);
                info!(
                    host = %self.config.host_name,
                    handlers = registered,
                    routes = self.metadata.route_count(),
                    invokers = self.invokers.len(),
                    "service manager ready"
                );
                Ok(self)
            }
            Err(err) => {
                self.set_state(ManagerState::Faulted);
                error!(host = %self.config.host_name, error = %err, "service manager init failed");
                Err(err)
            }
        }
    }

    fn populate(&self) -> Result<usize, ServiceError> {
        let entries = scan(&self.collections)?;
        let mut registered = 0;

        for entry in entries {
            if !entry.declares_contract() {
                debug!(type_name = entry.key().name(), "skipping non-handler type");
                continue;
            }
            self.register_entry(entry, self.config.default_lifecycle)?;
            registered += 1;
        }

        if self.config.eager_invokers {
            self.invokers.warm();
        }
        Ok(registered)
    }

    fn register_entry(
        &self,
        entry: TypeEntry,
        lifecycle: Lifecycle,
    ) -> Result<HandlerVariant, ServiceError> {
        let handler = classify(entry)?;
        let factory = handler
            .factory()
            .cloned()
            .ok_or(RegistrationError::MissingFactory {
                handler_type: handler.key().name(),
            })?;

        let handler = self
            .metadata
            .add_handler_with(handler, lifecycle, |handler| {
                self.container
                    .register_type(handler.key(), factory, lifecycle)
                    .map_err(ServiceError::from)
            })?;
        debug!(
            handler = handler.key().name(),
            variant = ?handler.variant(),
            %lifecycle,
            "registered handler type"
        );
        Ok(handler.variant())
    }

    /// Registers one more handler type after `init`.
    ///
    /// Registering a handler type that is already registered is a no-op:
    /// its container binding, lifecycle and any shared instance are kept.
    ///
    /// Returns `HandlerVariant::Generic(message_type)` for request handlers
    /// and `HandlerVariant::NonGeneric` for marker services.
    ///
    /// # Errors
    ///
    /// - `InvalidState` / `Disposed` outside the `Ready` state.
    /// - `Classify(TypeMismatch)` when the type declares no handler contract.
    /// - `Registration(Duplicate)` when one of its message types is taken.
    /// - `Registration(MissingFactory)` when the declaration has no factory.
    pub fn register_service(&self, entry: TypeEntry) -> Result<HandlerVariant, ServiceError> {
        self.ensure_ready()?;
        self.register_entry(entry, self.config.default_lifecycle)
    }

    /// Registers a pre-built instance as the handler for its own type.
    ///
    /// Intended for test harnesses. The one instance serves every request,
    /// including concurrent ones, and the container never builds a fresh
    /// handler per request, so per-request dependencies are unavailable.
    /// Only use it in production when the instance holds no per-request
    /// state. If the handler type is already registered, `instance` is
    /// dropped and the existing registration stays in place.
    ///
    /// # Errors
    ///
    /// Same as `register_service`, minus `MissingFactory`.
    pub fn register_instance<T: Any + Send + Sync>(
        &self,
        declaration: TypeBuilder<T>,
        instance: Arc<T>,
    ) -> Result<HandlerVariant, ServiceError> {
        self.ensure_ready()?;
        let handler = classify(declaration.build())?;
        let handler = self
            .metadata
            .add_handler_with(handler, Lifecycle::Shared, |handler| {
                self.container
                    .register_singleton_instance(handler.key(), instance)
                    .map_err(ServiceError::from)
            })?;
        debug!(handler = handler.key().name(), "registered singleton handler instance");
        Ok(handler.variant())
    }

    /// Routes `message_type` to an already registered `AnyService` handler.
    ///
    /// # Errors
    ///
    /// `InvalidState` / `Disposed` outside `Ready`, otherwise the
    /// `RegistrationError` from the metadata registry.
    pub fn register_route(
        &self,
        message_type: TypeKey,
        handler_type: TypeKey,
    ) -> Result<(), ServiceError> {
        self.ensure_ready()?;
        self.metadata.register(handler_type, message_type)?;
        debug!(
            message_type = message_type.name(),
            handler = handler_type.name(),
            "bound route"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Invoker for `message_type`, built on first use.
    ///
    /// # Errors
    ///
    /// `UnknownRequestType` when no handler serves `message_type`.
    pub fn invoker(&self, message_type: TypeKey) -> Result<Arc<Invoker>, ServiceError> {
        self.invokers.resolve(message_type)
    }

    /// Executes `request` with the handler registered for its message type.
    ///
    /// # Errors
    ///
    /// - `UnknownRequestType` when no handler serves the request type; no
    ///   instance is resolved in that case.
    /// - `Handler` carrying the handler's own error, unaltered.
    /// - `Disposed` / `InvalidState` outside the `Ready` state.
    pub async fn execute(&self, request: Request) -> Result<Response, ServiceError> {
        self.dispatch(request).await
    }

    /// Same as `execute`, returning an owned `'static` future.
    ///
    /// Lookup and instance resolution run before this returns; the future
    /// only drives the handler.
    pub fn dispatch(&self, request: Request) -> DispatchFuture {
        if let Err(err) = self.ensure_ready() {
            return Box::pin(ready(Err(err)));
        }
        let invoker = match self.invokers.resolve(request.message_type()) {
            Ok(invoker) => invoker,
            Err(err) => return Box::pin(ready(Err(err))),
        };

        let guard = InFlightGuard::new(Arc::clone(&self.in_flight));
        let fut = invoker.call(self.container.as_ref(), request);
        Box::pin(async move {
            let _guard = guard;
            fut.await
        })
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Waits until no `execute` call is running, up to `timeout`.
    ///
    /// Returns `true` if the manager drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.in_flight_count() == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Releases the container and the invoker cache.
    ///
    /// Must run at most once and after in-flight requests have drained;
    /// requests still running keep the handler instances they resolved.
    ///
    /// # Errors
    ///
    /// `Disposed` when called twice; container errors otherwise.
    pub fn dispose(&self) -> Result<(), ServiceError> {
        if self.state() == ManagerState::Disposed {
            return Err(ServiceError::Disposed);
        }
        self.set_state(ManagerState::Disposed);

        let in_flight = self.in_flight_count();
        if in_flight > 0 {
            warn!(in_flight, "disposing service manager with requests in flight");
        }
        self.invokers.clear();
        self.container.dispose()?;
        info!(host = %self.config.host_name, "service manager disposed");
        Ok(())
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("host", &self.config.host_name)
            .field("state", &self.state())
            .field("handlers", &self.metadata.handler_count())
            .field("invokers", &self.invokers.len())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight counter when dropped, including on panic.
struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl InFlightGuard {
    fn new(in_flight: Arc<AtomicU64>) -> Self {
        in_flight.fetch_add(1, Ordering::Relaxed);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
