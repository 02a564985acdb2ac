//! Load-shedding middleware for data operations.
//!
//! Rejects operations with `DataError::Overloaded` once
//! `max_concurrent_operations` are already in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tenantry_core::ScopedOperation;
use tokio::sync::Semaphore;
use tower::{Layer, Service};

use crate::service::operation::{DataError, OperationOutput};

// ---------------------------------------------------------------------------
// LoadShedLayer
// ---------------------------------------------------------------------------

/// Tower layer that limits concurrent data operations via a semaphore.
///
/// When all permits are taken, incoming operations fail immediately instead of
/// queueing.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    semaphore: Arc<Semaphore>,
}

impl LoadShedLayer {
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

impl<S> Service<ScopedOperation> for LoadShedService<S>
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
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
            tracing::warn!(entity = op.entity.as_str(), "shedding data operation");
            return Box::pin(async { Err(DataError::Overloaded) });
        };

        let fut = self.inner.call(op);
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
