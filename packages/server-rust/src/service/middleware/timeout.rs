//! Timeout middleware for data operations.
//!
//! Rejects operations that run longer than the configured limit with
//! `DataError::Timeout`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tenantry_core::ScopedOperation;
use tower::{Layer, Service};

use crate::service::operation::{DataError, OperationOutput};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that bounds every data operation by the same deadline.
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

/// Service wrapper that enforces the operation deadline.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<ScopedOperation> for TimeoutService<S>
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
        let duration = self.timeout;
        let fut = self.inner.call(op);
        Box::pin(async move {
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let timeout_ms = duration.as_millis() as u64;
                    Err(DataError::Timeout { timeout_ms })
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tenantry_core::{Filter, Operation};
    use tower::ServiceExt;

    use super::*;

    /// Service that takes a configurable delay before responding.
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<ScopedOperation> for SlowService {
        type Response = OperationOutput;
        type Error = DataError;
        type Future =
            Pin<Box<dyn Future<Output = Result<OperationOutput, DataError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: ScopedOperation) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(OperationOutput::Count(0))
            })
        }
    }

    fn count_op() -> ScopedOperation {
        ScopedOperation::new(
            "Invoice",
            Operation::Count {
                filter: Filter::all(),
            },
        )
    }

    #[tokio::test]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer::from_millis(1000).layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(count_op()).await.unwrap();
        assert_eq!(resp, OperationOutput::Count(0));
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_returns_error() {
        let svc = TimeoutLayer::from_millis(50).layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(count_op()).await.unwrap_err();
        assert!(matches!(err, DataError::Timeout { timeout_ms: 50 }));
    }
}
