//! Metrics middleware for data operations.
//!
//! Wraps each operation in a `data_operation` tracing span and records
//! `tenantry_data_operations_total` and `tenantry_data_operation_duration_ms`
//! through the `metrics` facade.
//!
//! Entity names arrive from request paths, so the `entity` label only carries
//! registered names; anything else is recorded as `unknown`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tenantry_core::{PolicyRegistry, ScopedOperation};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{DataError, OperationOutput};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Label value for `entity`: the name itself when registered, else `unknown`.
pub(crate) fn entity_label(registry: &PolicyRegistry, entity: &str) -> String {
    if registry.get(entity).is_some() {
        entity.to_string()
    } else {
        UNKNOWN_ENTITY.to_string()
    }
}

const UNKNOWN_ENTITY: &str = "unknown";

/// Tower layer that instruments data operations with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    registry: Arc<PolicyRegistry>,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            registry: Arc::clone(&self.registry),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records operation duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    registry: Arc<PolicyRegistry>,
}

impl<S> Service<ScopedOperation> for MetricsService<S>
where
    S: Service<ScopedOperation, Response = OperationOutput, Error = DataError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationOutput;
    type Error = DataError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationOutput, DataError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: ScopedOperation) -> Self::Future {
        let entity = op.entity.clone();
        let label = entity_label(&self.registry, &entity);
        let kind = op.kind().as_str();

        let span = info_span!(
            "data_operation",
            entity = entity.as_str(),
            kind = kind,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let start = Instant::now();
        let fut = span.in_scope(|| self.inner.call(op));

        Box::pin(
            async move {
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(DataError::Timeout { .. }) => "timeout",
                    Err(DataError::Overloaded) => "overloaded",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    "tenantry_data_operations_total",
                    "entity" => label.clone(),
                    "kind" => kind,
                    "outcome" => outcome
                )
                .increment(1);
                metrics::histogram!(
                    "tenantry_data_operation_duration_ms",
                    "entity" => label,
                    "kind" => kind
                )
                .record(elapsed.as_secs_f64() * 1000.0);

                match &result {
                    Ok(output) => tracing::debug!(
                        entity = entity.as_str(),
                        kind,
                        result = output.label(),
                        duration_ms,
                        "data operation complete"
                    ),
                    Err(err) => tracing::info!(
                        entity = entity.as_str(),
                        kind,
                        duration_ms,
                        error = %err,
                        "data operation failed"
                    ),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
