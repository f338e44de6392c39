//! Timeout middleware for dispatched requests.
//!
//! Rejects requests that run longer than the configured limit with
//! `ServiceError::Timeout`.

use std::task::{Context, Poll};
use std::time::Duration;

use servhost_core::{Request, Response};
use tower::{Layer, Service};

use crate::service::dispatch::DispatchFuture;
use crate::service::error::ServiceError;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that bounds every request by a fixed timeout.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    timeout: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn from_millis(timeout_ms: u64) -> Self {
        Self::new(Duration::from_millis(timeout_ms))
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces the request timeout.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<Request> for TimeoutService<S>
where
    S: Service<Request, Response = Response, Error = ServiceError> + Send,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = ServiceError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let duration = self.timeout;
        let fut = self.inner.call(request);
        Box::pin(async move {
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let timeout_ms = duration.as_millis() as u64;
                    Err(ServiceError::Timeout { timeout_ms })
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
