//! Metrics middleware for dispatched requests.
//!
//! Wraps each request in a `tracing` span keyed by message type and records
//! `servhost_requests_total` and `servhost_request_duration_seconds` through
//! the `metrics` facade. Without an installed recorder the `metrics` calls
//! are no-ops.

use std::task::{Context, Poll};
use std::time::Instant;

use metrics::{counter, histogram};
use servhost_core::{Request, Response};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::dispatch::DispatchFuture;
use crate::service::error::ServiceError;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments requests with timing and outcome counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

fn outcome(result: &Result<Response, ServiceError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ServiceError::UnknownRequestType { .. }) => "unknown",
        Err(ServiceError::Timeout { .. }) => "timeout",
        Err(ServiceError::Overloaded) => "overloaded",
        Err(_) => "error",
    }
}

impl<S> Service<Request> for MetricsService<S>
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
        let message_type = request.message_type().short_name();

        let span = info_span!(
            "dispatch",
            message_type = message_type,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = outcome(&result);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                counter!(
                    "servhost_requests_total",
                    "message_type" => message_type,
                    "outcome" => outcome
                )
                .increment(1);
                histogram!("servhost_request_duration_seconds", "message_type" => message_type)
                    .record(elapsed.as_secs_f64());

                tracing::debug!(message_type, duration_ms, outcome, "request complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
