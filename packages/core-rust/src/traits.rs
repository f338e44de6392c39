use async_trait::async_trait;

use crate::message::{Request, Response};
use crate::types::TypeKey;

/// Strongly-typed handler contract: one handler per request message type.
///
/// The associated `Request` type is the dispatch key the handler is
/// registered under.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Message type this handler accepts.
    type Request: Send + 'static;
    /// Value produced for each request.
    type Response: Send + 'static;

    /// Process one request.
    async fn handle(&self, request: Self::Request) -> anyhow::Result<Self::Response>;
}

/// Loosely-typed marker contract. The service receives the raw envelope and
/// decides how to interpret it.
///
/// A marker service has no message type derivable from its declaration. It is
/// reachable through the message types returned by `routes()` and through any
/// route the host binds explicitly.
#[async_trait]
pub trait AnyService: Send + Sync + 'static {
    /// Message types this service answers for out of the box.
    fn routes() -> Vec<TypeKey>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Process one request of any routed type.
    async fn any(&self, request: Request) -> anyhow::Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl RequestHandler for Upper {
        type Request = String;
        type Response = String;

        async fn handle(&self, request: String) -> anyhow::Result<String> {
            Ok(request.to_uppercase())
        }
    }

    struct Sink;

    #[async_trait]
    impl AnyService for Sink {
        async fn any(&self, request: Request) -> anyhow::Result<Response> {
            Ok(Response::new(request.message_type().short_name().to_string()))
        }
    }

    #[tokio::test]
    async fn request_handler_handles_typed_payload() {
        let out = Upper.handle("abc".to_string()).await.unwrap();
        assert_eq!(out, "ABC");
    }

    #[tokio::test]
    async fn any_service_defaults_to_no_routes() {
        assert!(Sink::routes().is_empty());
        let resp = Sink.any(Request::new(5_u8)).await.unwrap();
        assert_eq!(resp.downcast::<String>().unwrap(), "u8");
    }
}
