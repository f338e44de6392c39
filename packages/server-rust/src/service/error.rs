use std::fmt;

use crate::container::ContainerError;

/// Lifecycle state of a `ServiceManager`.
///
/// State machine: Uninitialized -> Initializing -> Ready -> Disposed, with
/// Initializing -> Faulted when discovery or registration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed, `init` not yet called.
    Uninitialized,
    /// `init` is scanning and registering.
    Initializing,
    /// Accepting registrations and requests.
    Ready,
    /// `init` failed; the registry must not be used.
    Faulted,
    /// `dispose` has run.
    Disposed,
}

impl ManagerState {
    /// Returns the state name as a static string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Faulted => "faulted",
            Self::Disposed => "disposed",
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type enumeration failed inside a collection.
#[derive(Debug, thiserror::Error)]
#[error(
    "failed to enumerate types in collection `{collection}` (last type processed: {})",
    .last_type.as_deref().unwrap_or("<none>")
)]
pub struct ScanError {
    /// Name of the collection being enumerated.
    pub collection: String,
    /// Last type successfully read before the failure.
    pub last_type: Option<String>,
    #[source]
    pub source: anyhow::Error,
}

/// A type offered for registration matches no handler contract.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("type {type_name} implements neither RequestHandler nor AnyService")]
    TypeMismatch { type_name: &'static str },
}

/// Metadata registry rejected a registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(
        "request type {message_type} is already handled by {existing}; cannot register {attempted}"
    )]
    Duplicate {
        message_type: &'static str,
        existing: &'static str,
        attempted: &'static str,
    },
    #[error("handler type {handler_type} is not registered")]
    UnknownHandler { handler_type: &'static str },
    #[error("handler type {handler_type} only accepts {accepts}; cannot route {message_type} to it")]
    NotRoutable {
        handler_type: &'static str,
        accepts: &'static str,
        message_type: &'static str,
    },
    #[error("handler type {handler_type} was declared without a factory")]
    MissingFactory { handler_type: &'static str },
}

/// Errors surfaced by the service manager and the dispatch pipeline.
///
/// Handler failures are carried transparently in `Handler`; the original
/// error is reachable with `anyhow::Error::downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("no handler registered for request type {type_name}")]
    UnknownRequestType { type_name: &'static str },
    #[error("handler {handler_type} expected a {expected} request but received {actual}")]
    RequestMismatch {
        handler_type: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error(transparent)]
    Handler(anyhow::Error),
    #[error("service manager has been disposed")]
    Disposed,
    #[error("service manager is {actual}, expected {expected}")]
    InvalidState {
        expected: ManagerState,
        actual: ManagerState,
    },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
}

impl ServiceError {
    /// True for errors a caller can map to a "not found" / "bad request"
    /// reply rather than a server fault.
    #[must_use]
    pub fn is_unknown_request(&self) -> bool {
        matches!(self, Self::UnknownRequestType { .. })
    }
}
