//! Tower adapter: exposes a `ServiceManager` as `tower::Service<Request>`.

use std::sync::Arc;
use std::task::{Context, Poll};

use servhost_core::{Request, Response};
use tower::Service;

use super::dispatch::DispatchFuture;
use super::error::ServiceError;
use super::manager::ServiceManager;

/// Cloneable `tower::Service` that dispatches every request through a shared
/// `ServiceManager`.
///
/// `poll_ready` fails while the manager is not `Ready`, so a transport can
/// stop accepting work once the manager is disposed.
#[derive(Clone)]
pub struct DispatchService {
    manager: Arc<ServiceManager>,
}

impl DispatchService {
    #[must_use]
    pub fn new(manager: Arc<ServiceManager>) -> Self {
        Self { manager }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }
}

impl Service<Request> for DispatchService {
    type Response = Response;
    type Error = ServiceError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(self.manager.ensure_ready())
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.manager.dispatch(request)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use servhost_core::RequestHandler;
    use tower::ServiceExt;

    use super::*;
    use crate::container::FactoryContainer;
    use crate::service::config::HostConfig;
    use crate::service::error::ManagerState;
    use crate::service::scan::{StaticCollection, TypeEntry};

    struct Add(i64, i64);
    struct Unknown;

    #[derive(Default)]
    struct Adder;

    #[async_trait]
    impl RequestHandler for Adder {
        type Request = Add;
        type Response = i64;

        async fn handle(&self, request: Add) -> anyhow::Result<i64> {
            Ok(request.0 + request.1)
        }
    }

    fn ready_manager() -> Arc<ServiceManager> {
        let manager = ServiceManager::new(HostConfig::default(), Arc::new(FactoryContainer::new()))
            .with_collection(StaticCollection::new("math").with(TypeEntry::handler::<Adder>()));
        manager.init().unwrap();
        Arc::new(manager)
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let svc = DispatchService::new(ready_manager());
        let resp = svc.oneshot(Request::new(Add(2, 3))).await.unwrap();
        assert_eq!(resp.downcast::<i64>().unwrap(), 5);
    }

    #[tokio::test]
    async fn unknown_request_returns_error() {
        let svc = DispatchService::new(ready_manager());
        let err = svc.oneshot(Request::new(Unknown)).await.unwrap_err();
        assert!(err.is_unknown_request());
    }

    #[tokio::test]
    async fn not_ready_before_init() {
        let manager = Arc::new(ServiceManager::new(
            HostConfig::default(),
            Arc::new(FactoryContainer::new()),
        ));
        let mut svc = DispatchService::new(manager);
        let err = ServiceExt::ready(&mut svc).await.err().unwrap();
        assert!(matches!(
            err,
            ServiceError::InvalidState {
                actual: ManagerState::Uninitialized,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn not_ready_after_dispose() {
        let manager = ready_manager();
        let mut svc = DispatchService::new(Arc::clone(&manager));
        manager.dispose().unwrap();
        let err = ServiceExt::ready(&mut svc).await.err().unwrap();
        assert!(matches!(err, ServiceError::Disposed));
    }
}
