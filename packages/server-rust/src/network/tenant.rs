//! Request-boundary tenant context propagation.
//!
//! [`TenantContextLayer`] wraps the routed handlers and runs each request
//! inside [`propagate`], so every data operation issued while handling the
//! request sees that request's [`TenantContext`](tenantry_core::TenantContext).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Request;
use tenantry_core::{propagate, AuthenticatedPrincipal};
use tower::{Layer, Service};

#[derive(Debug, Clone, Copy, Default)]
pub struct TenantContextLayer;

impl<S> Layer<S> for TenantContextLayer {
    type Service = TenantContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantContextService { inner }
    }
}

/// Binds the caller's tenant context around the inner service.
#[derive(Debug, Clone)]
pub struct TenantContextService<S> {
    inner: S,
}

impl<S> Service<Request> for TenantContextService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // The readied service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let principal = request.extensions().get::<AuthenticatedPrincipal>().cloned();

        Box::pin(async move {
            propagate(principal.as_ref(), async move { inner.call(request).await }).await
        })
    }
}
