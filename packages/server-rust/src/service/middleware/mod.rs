//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`timeout`]: Per-request timeout enforcement
//! - [`metrics`]: Request timing and counting via `tracing` spans and `metrics`
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`pipeline`]: Composes all layers over a `DispatchService`

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::build_dispatch_pipeline;
pub use timeout::TimeoutLayer;

#[cfg(test)]
pub(crate) mod test_support {
    use std::task::{Context, Poll};
    use std::time::Duration;

    use servhost_core::{Request, Response};
    use tower::Service;

    use crate::service::dispatch::DispatchFuture;
    use crate::service::error::ServiceError;

    /// Echoes the request payload back after a configurable delay.
    pub(crate) struct SlowEcho {
        pub(crate) delay_ms: u64,
    }

    impl Service<Request> for SlowEcho {
        type Response = Response;
        type Error = ServiceError;
        type Future = DispatchFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                match request.downcast::<u32>() {
                    Ok(n) => Ok(Response::new(n)),
                    Err(other) => Err(ServiceError::UnknownRequestType {
                        type_name: other.message_type().name(),
                    }),
                }
            })
        }
    }
}
