//! Load-shedding middleware for dispatched requests.
//!
//! Rejects requests when the host is overloaded (concurrent count exceeds
//! `max_concurrent_operations`) with `ServiceError::Overloaded`.

use std::sync::Arc;
use std::task::{Context, Poll};

use servhost_core::{Request, Response};
use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::dispatch::DispatchFuture;
use crate::service::error::ServiceError;

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent requests via a semaphore.
///
/// When all permits are taken, incoming requests are rejected immediately
/// with `ServiceError::Overloaded` rather than queued.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
    /// Create a new `LoadShedLayer` with the given concurrency limit.
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadShedService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
}

impl<S> Service<Request> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            return Box::pin(async { Err(ServiceError::Overloaded) });
        };

        let fut = self.inner.call(request);
        Box::pin(async move {
            let result = fut.await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::middleware::test_support::SlowEcho;

    #[tokio::test]
    async fn allows_requests_under_limit() {
        let svc = LoadShedLayer::new(10).layer(SlowEcho { delay_ms: 1 });
        let resp = svc.oneshot(Request::new(1_u32)).await.unwrap();
        assert_eq!(resp.downcast::<u32>().unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_when_overloaded() {
        let mut svc = LoadShedLayer::new(1).layer(SlowEcho { delay_ms: 500 });

        ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = tokio::spawn(svc.call(Request::new(1_u32)));

        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = svc.call(Request::new(2_u32)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Overloaded));

        // Permit is released once the first request finishes.
        in_flight.await.unwrap().unwrap();
        let resp = svc.call(Request::new(3_u32)).await.unwrap();
        assert_eq!(resp.downcast::<u32>().unwrap(), 3);
    }
}
