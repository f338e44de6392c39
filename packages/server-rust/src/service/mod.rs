//! Service discovery, registration and dispatch.
//!
//! 1. **Scanning** (`scan`): `TypeCollection` -> `Vec<TypeEntry>`
//! 2. **Classification** (`classify`): `TypeEntry` -> `HandlerType` (Generic or `NonGeneric`)
//! 3. **Metadata** (`metadata`): one handler per message type
//! 4. **Dispatch** (`dispatch`): lazily built, cached invokers per message type
//! 5. **Manager** (`manager`): init / register / execute / dispose
//! 6. **Routing and middleware** (`router`, `middleware`): tower integration

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod middleware;
pub mod router;
pub mod scan;

pub use classify::{classify, HandlerType, HandlerVariant};
pub use config::HostConfig;
pub use dispatch::{DispatchFuture, Invoker, InvokerCache};
pub use error::{ClassifyError, ManagerState, RegistrationError, ScanError, ServiceError};
pub use manager::ServiceManager;
pub use metadata::{RegistrationEntry, ServiceMetadata};
pub use middleware::build_dispatch_pipeline;
pub use router::DispatchService;
pub use scan::{scan, StaticCollection, TypeBuilder, TypeCollection, TypeEntry};
