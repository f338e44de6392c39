//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use servhost_core::{Request, Response};
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::HostConfig;
use crate::service::error::ServiceError;
use crate::service::manager::ServiceManager;
use crate::service::router::DispatchService;

/// Build the dispatch pipeline by wrapping a `DispatchService` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce `default_operation_timeout_ms`
/// 3. `MetricsLayer` -- record timing and outcome (closest to the handler)
#[must_use]
pub fn build_dispatch_pipeline(
    manager: Arc<ServiceManager>,
    config: &HostConfig,
) -> impl tower::Service<Request, Response = Response, Error = ServiceError> + Clone {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer::from_millis(config.default_operation_timeout_ms))
        .layer(MetricsLayer)
        .service(DispatchService::new(manager))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
