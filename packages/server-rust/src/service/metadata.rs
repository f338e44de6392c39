//! Metadata registry: which handler type serves each request message type.
//!
//! Exactly one `ServiceMetadata` exists per service host. It is built during
//! `ServiceManager::init` and shared as `Arc<ServiceMetadata>` with the
//! resolver cache and any controller reading it. Writers are serialised;
//! readers never block on each other.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use servhost_core::{Lifecycle, TypeKey};
use tracing::debug;

use super::classify::{HandlerType, HandlerVariant};
use super::error::RegistrationError;

/// One request message type bound to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationEntry {
    pub message_type: TypeKey,
    pub handler_type: TypeKey,
    pub lifecycle: Lifecycle,
}

struct HandlerRecord {
    handler: Arc<HandlerType>,
    lifecycle: Lifecycle,
}

/// Index of registered handler types and their message routes.
pub struct ServiceMetadata {
    /// Handler type -> classified handler and its lifecycle.
    handlers: DashMap<TypeKey, HandlerRecord>,
    /// Request message type -> handler type.
    routes: DashMap<TypeKey, TypeKey>,
    /// Handler registration order, for deterministic enumeration.
    order: RwLock<Vec<TypeKey>>,
    /// Serialises conflict checks with the inserts that follow them.
    writer: Mutex<()>,
}

impl ServiceMetadata {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            routes: DashMap::new(),
            order: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Adds a classified handler together with the routes it declares.
    ///
    /// Adding a handler type that is already registered with the same routes
    /// is a no-op: the existing record (and its lifecycle) is returned.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Duplicate` if any declared route is
    /// already bound to a different handler type. Nothing is inserted in
    /// that case.
    pub fn add_handler(
        &self,
        handler: HandlerType,
        lifecycle: Lifecycle,
    ) -> Result<Arc<HandlerType>, RegistrationError> {
        self.add_handler_with(handler, lifecycle, |_| Ok(()))
    }

    /// Like `add_handler`, running `bind` after the conflict checks and
    /// before the insert, all under the writer lock. `bind` is skipped when
    /// the handler type is already registered with the same routes.
    ///
    /// # Errors
    ///
    /// `Duplicate` on a route conflict, or whatever `bind` returns. Nothing
    /// is inserted when either fails.
    pub fn add_handler_with<E, F>(
        &self,
        handler: HandlerType,
        lifecycle: Lifecycle,
        bind: F,
    ) -> Result<Arc<HandlerType>, E>
    where
        E: From<RegistrationError>,
        F: FnOnce(&HandlerType) -> Result<(), E>,
    {
        let _writer = self.writer.lock();

        let key = handler.key();
        if let Some(existing) = self.handler(key) {
            if existing.routes() == handler.routes() {
                debug!(handler = key.name(), "handler type already registered");
                return Ok(existing);
            }
        }

        self.check_routes(&handler)?;
        bind(&handler)?;

        let handler = Arc::new(handler);
        for &message_type in handler.routes() {
            self.routes.insert(message_type, key);
        }
        let previous = self.handlers.insert(
            key,
            HandlerRecord {
                handler: Arc::clone(&handler),
                lifecycle,
            },
        );
        if previous.is_none() {
            self.order.write().push(key);
        }
        Ok(handler)
    }

    /// Checks that every route `handler` declares is free or already bound
    /// to the same handler type.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Duplicate` on the first conflicting route.
    pub fn check_routes(&self, handler: &HandlerType) -> Result<(), RegistrationError> {
        handler
            .routes()
            .iter()
            .try_for_each(|&message_type| self.check_route(message_type, handler.key()))
    }

    fn check_route(
        &self,
        message_type: TypeKey,
        handler_type: TypeKey,
    ) -> Result<(), RegistrationError> {
        match self.routes.get(&message_type) {
            Some(existing) if *existing != handler_type => Err(RegistrationError::Duplicate {
                message_type: message_type.name(),
                existing: existing.name(),
                attempted: handler_type.name(),
            }),
            _ => Ok(()),
        }
    }

    /// Binds `message_type` to an already added handler type.
    ///
    /// Registering the identical pair again is a no-op.
    ///
    /// # Errors
    ///
    /// - `UnknownHandler` if `handler_type` was never added.
    /// - `NotRoutable` if the handler is `Generic` and bound to another message type.
    /// - `Duplicate` if `message_type` is bound to a different handler type.
    pub fn register(
        &self,
        handler_type: TypeKey,
        message_type: TypeKey,
    ) -> Result<(), RegistrationError> {
        let _writer = self.writer.lock();

        let variant = self
            .handlers
            .get(&handler_type)
            .map(|record| record.handler.variant())
            .ok_or(RegistrationError::UnknownHandler {
                handler_type: handler_type.name(),
            })?;
        if let HandlerVariant::Generic(accepts) = variant {
            if accepts != message_type {
                return Err(RegistrationError::NotRoutable {
                    handler_type: handler_type.name(),
                    accepts: accepts.name(),
                    message_type: message_type.name(),
                });
            }
        }

        self.check_route(message_type, handler_type)?;
        self.routes.insert(message_type, handler_type);
        Ok(())
    }

    /// Handler serving `message_type`.
    #[must_use]
    pub fn lookup(&self, message_type: TypeKey) -> Option<Arc<HandlerType>> {
        let handler_type = *self.routes.get(&message_type)?;
        self.handler(handler_type)
    }

    /// Full registration entry for `message_type`.
    #[must_use]
    pub fn entry(&self, message_type: TypeKey) -> Option<RegistrationEntry> {
        let handler_type = *self.routes.get(&message_type)?;
        let lifecycle = self.lifecycle(handler_type)?;
        Some(RegistrationEntry {
            message_type,
            handler_type,
            lifecycle,
        })
    }

    #[must_use]
    pub fn handler(&self, handler_type: TypeKey) -> Option<Arc<HandlerType>> {
        self.handlers
            .get(&handler_type)
            .map(|record| Arc::clone(&record.handler))
    }

    #[must_use]
    pub fn lifecycle(&self, handler_type: TypeKey) -> Option<Lifecycle> {
        self.handlers
            .get(&handler_type)
            .map(|record| record.lifecycle)
    }

    /// Every registered handler type, in registration order.
    #[must_use]
    pub fn all_handler_types(&self) -> Vec<Arc<HandlerType>> {
        self.order
            .read()
            .iter()
            .filter_map(|key| self.handler(*key))
            .collect()
    }

    /// Every routed message type, sorted by name.
    #[must_use]
    pub fn message_types(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.routes.iter().map(|entry| *entry.key()).collect();
        keys.sort();
        keys
    }

    /// Every registration entry, sorted by message type name.
    #[must_use]
    pub fn entries(&self) -> Vec<RegistrationEntry> {
        self.message_types()
            .into_iter()
            .filter_map(|message_type| self.entry(message_type))
            .collect()
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl Default for ServiceMetadata {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
