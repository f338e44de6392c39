//! Handler classification: decides which calling convention a declared type
//! is dispatched through.

use std::fmt;

use servhost_core::TypeKey;
use tracing::debug;

use super::dispatch::InvokeFn;
use super::error::ClassifyError;
use super::scan::TypeEntry;
use crate::container::Factory;

/// Calling convention of a classified handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerVariant {
    /// `RequestHandler` bound to one request message type.
    Generic(TypeKey),
    /// `AnyService` marker contract; reachable through declared or bound routes.
    NonGeneric,
}

/// A declared type that passed classification. Immutable once built.
pub struct HandlerType {
    key: TypeKey,
    variant: HandlerVariant,
    response_type: Option<TypeKey>,
    routes: Vec<TypeKey>,
    invoke: InvokeFn,
    factory: Option<Factory>,
}

impl HandlerType {
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[must_use]
    pub fn variant(&self) -> HandlerVariant {
        self.variant
    }

    /// Bound message type for `Generic` handlers.
    #[must_use]
    pub fn message_type(&self) -> Option<TypeKey> {
        match self.variant {
            HandlerVariant::Generic(message_type) => Some(message_type),
            HandlerVariant::NonGeneric => None,
        }
    }

    /// Declared response type for `Generic` handlers.
    #[must_use]
    pub fn response_type(&self) -> Option<TypeKey> {
        self.response_type
    }

    /// Message types the handler is registered under at declaration time:
    /// the bound message type for `Generic`, the self-declared routes for
    /// `NonGeneric`.
    #[must_use]
    pub fn routes(&self) -> &[TypeKey] {
        &self.routes
    }

    pub(crate) fn invoke_fn(&self) -> InvokeFn {
        self.invoke
    }

    pub(crate) fn factory(&self) -> Option<&Factory> {
        self.factory.as_ref()
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerType")
            .field("key", &self.key.name())
            .field("variant", &self.variant)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// Classifies a declared type.
///
/// Decision order: the generic `RequestHandler` contract wins, then the
/// `AnyService` marker contract; a type declaring neither is rejected.
///
/// # Errors
///
/// Returns `ClassifyError::TypeMismatch` when the type declares no handler
/// contract.
pub fn classify(entry: TypeEntry) -> Result<HandlerType, ClassifyError> {
    let key = entry.key();
    let factory = entry.factory().cloned();

    if let Some(contract) = entry.request_contract {
        if entry.service_contract.is_some() {
            debug!(
                handler = key.name(),
                "type declares both contracts; using RequestHandler"
            );
        }
        return Ok(HandlerType {
            key,
            variant: HandlerVariant::Generic(contract.message_type),
            response_type: Some(contract.response_type),
            routes: vec![contract.message_type],
            invoke: contract.invoke,
            factory,
        });
    }

    if let Some(contract) = entry.service_contract {
        return Ok(HandlerType {
            key,
            variant: HandlerVariant::NonGeneric,
            response_type: None,
            routes: contract.routes,
            invoke: contract.invoke,
            factory,
        });
    }

    Err(ClassifyError::TypeMismatch {
        type_name: key.name(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
