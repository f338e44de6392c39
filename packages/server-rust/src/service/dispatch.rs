//! Dispatch table: cached invokers keyed by request message type.
//!
//! An [`Invoker`] pairs a message type with its classified handler. Calling
//! it resolves a handler instance from the container and runs the handler's
//! monomorphised invoke function. The [`InvokerCache`] builds invokers on
//! first use (or eagerly via `warm`) and never evicts; the number of entries
//! is bounded by the registered message types.

use std::future::{ready, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use servhost_core::{AnyService, Request, RequestHandler, Response, TypeKey};
use tracing::{debug, trace};

use super::classify::HandlerType;
use super::error::ServiceError;
use super::metadata::ServiceMetadata;
use crate::container::{Container, ContainerError, Instance};

/// Boxed `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by every dispatch.
pub type DispatchFuture = BoxFuture<'static, Result<Response, ServiceError>>;

/// Type-erased entry point of one handler type.
pub(crate) type InvokeFn = fn(Instance, Request) -> DispatchFuture;

fn downcast_handler<H: Send + Sync + 'static>(instance: Instance) -> Result<Arc<H>, ServiceError> {
    instance.downcast::<H>().map_err(|_| {
        ServiceError::Container(ContainerError::WrongInstanceType {
            type_name: TypeKey::of::<H>().name(),
        })
    })
}

pub(crate) fn invoke_request_handler<H: RequestHandler>(
    instance: Instance,
    request: Request,
) -> DispatchFuture {
    Box::pin(async move {
        let handler = downcast_handler::<H>(instance)?;
        let message = request.downcast::<H::Request>().map_err(|request| {
            ServiceError::RequestMismatch {
                handler_type: TypeKey::of::<H>().name(),
                expected: TypeKey::of::<H::Request>().name(),
                actual: request.message_type().name(),
            }
        })?;
        let response = handler.handle(message).await.map_err(ServiceError::Handler)?;
        Ok(Response::new(response))
    })
}

pub(crate) fn invoke_any_service<S: AnyService>(
    instance: Instance,
    request: Request,
) -> DispatchFuture {
    Box::pin(async move {
        let service = downcast_handler::<S>(instance)?;
        service.any(request).await.map_err(ServiceError::Handler)
    })
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Precomputed strategy for dispatching one message type.
#[derive(Debug)]
pub struct Invoker {
    message_type: TypeKey,
    handler: Arc<HandlerType>,
}

impl Invoker {
    #[must_use]
    pub fn message_type(&self) -> TypeKey {
        self.message_type
    }

    #[must_use]
    pub fn handler_type(&self) -> TypeKey {
        self.handler.key()
    }

    /// Resolves a handler instance and applies it to `request`.
    ///
    /// Resolution happens before the future is returned, so the future owns
    /// everything it needs. Handler errors come back unaltered inside
    /// `ServiceError::Handler`.
    pub fn call(&self, container: &dyn Container, request: Request) -> DispatchFuture {
        match container.resolve(self.handler.key()) {
            Ok(instance) => (self.handler.invoke_fn())(instance, request),
            Err(err) => Box::pin(ready(Err(ServiceError::from(err)))),
        }
    }
}

// ---------------------------------------------------------------------------
// InvokerCache
// ---------------------------------------------------------------------------

/// Lazily populated map from message type to invoker.
pub struct InvokerCache {
    metadata: Arc<ServiceMetadata>,
    invokers: DashMap<TypeKey, Arc<Invoker>>,
    misses: AtomicU64,
}

impl InvokerCache {
    #[must_use]
    pub fn new(metadata: Arc<ServiceMetadata>) -> Self {
        Self {
            metadata,
            invokers: DashMap::new(),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the invoker for `message_type`, building it on first use.
    ///
    /// Concurrent first uses of the same message type converge on a single
    /// cached invoker.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::UnknownRequestType` when no handler is
    /// registered for `message_type`. Nothing is cached in that case.
    pub fn resolve(&self, message_type: TypeKey) -> Result<Arc<Invoker>, ServiceError> {
        if let Some(hit) = self.invokers.get(&message_type) {
            return Ok(Arc::clone(hit.value()));
        }

        let handler =
            self.metadata
                .lookup(message_type)
                .ok_or(ServiceError::UnknownRequestType {
                    type_name: message_type.name(),
                })?;

        let invoker = self
            .invokers
            .entry(message_type)
            .or_insert_with(|| {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(
                    message_type = message_type.name(),
                    handler = handler.key().name(),
                    "built invoker"
                );
                Arc::new(Invoker {
                    message_type,
                    handler,
                })
            })
            .clone();
        Ok(invoker)
    }

    /// Builds invokers for every registered message type. Returns the number
    /// of cached invokers afterwards.
    pub fn warm(&self) -> usize {
        for message_type in self.metadata.message_types() {
            if let Err(err) = self.resolve(message_type) {
                debug!(message_type = message_type.name(), error = %err, "invoker warm-up skipped");
            }
        }
        self.invokers.len()
    }

    /// Cached invoker for `message_type`, without building one.
    #[must_use]
    pub fn get(&self, message_type: TypeKey) -> Option<Arc<Invoker>> {
        self.invokers
            .get(&message_type)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of invokers built so far.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }

    pub fn clear(&self) {
        self.invokers.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
