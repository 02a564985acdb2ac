//! Tenant scoping middleware.
//!
//! Runs the [`QueryScopingInterceptor`] on every operation before it reaches
//! the store. The ambient tenant context is read in `call`, which executes on
//! the request task inside the binding established at the HTTP boundary.

use std::sync::Arc;
use std::task::{Context, Poll};

use tenantry_core::{PolicyRegistry, QueryScopingInterceptor, ScopedOperation};
use tower::{Layer, Service};

use super::metrics::entity_label;
use crate::service::operation::{DataError, OperationOutput};

// ---------------------------------------------------------------------------
// ScopingLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScopingLayer {
    interceptor: QueryScopingInterceptor,
}

impl ScopingLayer {
    #[must_use]
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self {
            interceptor: QueryScopingInterceptor::new(registry),
        }
    }
}

impl<S> Layer<S> for ScopingLayer {
    type Service = ScopingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ScopingService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScopingService
// ---------------------------------------------------------------------------

/// Service wrapper that narrows each operation to the caller's tenant.
#[derive(Debug, Clone)]
pub struct ScopingService<S> {
    inner: S,
    interceptor: QueryScopingInterceptor,
}

impl<S> Service<ScopedOperation> for ScopingService<S>
where
    S: Service<ScopedOperation, Response = OperationOutput, Error = DataError>,
{
    type Response = OperationOutput;
    type Error = DataError;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut op: ScopedOperation) -> Self::Future {
        let outcome = self.interceptor.apply(&mut op);
        metrics::counter!(
            "tenantry_scoping_total",
            "entity" => entity_label(self.interceptor.registry(), &op.entity),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        self.inner.call(op)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::future::{ready, Ready};

    use tenantry_core::{
        document, store, Condition, EntitySchema, Filter, Operation, ScopingPolicy, TenantContext,
        Value,
    };
    use tower::ServiceExt;

    use super::*;

    /// Reports the equality condition on `tenant_id` it received, if any.
    #[derive(Clone)]
    struct Capture;

    impl Service<ScopedOperation> for Capture {
        type Response = OperationOutput;
        type Error = DataError;
        type Future = Ready<Result<OperationOutput, DataError>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, op: ScopedOperation) -> Self::Future {
            let tenant = op
                .operation
                .filter()
                .and_then(|f| f.fields.get("tenant_id"))
                .and_then(|cond| match cond {
                    Condition::Equals(value) => Some(value.clone()),
                    Condition::Operators(_) => None,
                });
            let doc = tenant.map(|value| document([("tenant_id", value)]));
            ready(Ok(OperationOutput::Document(doc)))
        }
    }

    fn layer() -> ScopingLayer {
        let mut builder = PolicyRegistry::builder(ScopingPolicy::default());
        builder
            .register(EntitySchema::new("Invoice").required_field("tenant_id"))
            .unwrap();
        ScopingLayer::new(Arc::new(builder.build().unwrap()))
    }

    fn find_all() -> ScopedOperation {
        ScopedOperation::new(
            "Invoice",
            Operation::FindOne {
                filter: Filter::all(),
            },
        )
    }

    fn tenant_condition(output: OperationOutput) -> Option<Value> {
        match output {
            OperationOutput::Document(Some(mut doc)) => doc.remove("tenant_id"),
            _ => None,
        }
    }

    #[tokio::test]
    async fn adds_tenant_condition_inside_scope() {
        let svc = layer().layer(Capture);
        let out = store::scope(TenantContext::for_tenant("acme"), async {
            svc.oneshot(find_all()).await
        })
        .await
        .unwrap();
        assert_eq!(tenant_condition(out), Some(Value::from("acme")));
    }

    #[tokio::test]
    async fn leaves_operation_alone_without_context() {
        let svc = layer().layer(Capture);
        let out = svc.oneshot(find_all()).await.unwrap();
        assert_eq!(tenant_condition(out), None);
    }

    #[tokio::test]
    async fn keeps_explicit_tenant_condition() {
        let svc = layer().layer(Capture);
        let op = ScopedOperation::new(
            "Invoice",
            Operation::FindOne {
                filter: Filter::all().with("tenant_id", Condition::eq("globex")),
            },
        );
        let out = store::scope(TenantContext::for_tenant("acme"), async {
            svc.oneshot(op).await
        })
        .await
        .unwrap();
        assert_eq!(tenant_condition(out), Some(Value::from("globex")));
    }
}
