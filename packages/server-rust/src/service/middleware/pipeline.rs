//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use tenantry_core::{PolicyRegistry, ScopedOperation};
use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::scoping::ScopingLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::ServerConfig;
use crate::service::operation::{DataError, OperationOutput};
use crate::storage::MemoryStore;

/// Type-erased data pipeline shared by every request handler.
pub type DataPipeline = BoxCloneSyncService<ScopedOperation, OperationOutput, DataError>;

/// Build the data pipeline by wrapping the store with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded (fail fast before doing any work)
/// 2. `TimeoutLayer` -- enforce the operation deadline
/// 3. `MetricsLayer` -- record timing and outcome
/// 4. `ScopingLayer` -- narrow the operation to the ambient tenant
///
/// Every layer calls its inner service synchronously from `call`, so the
/// scoping layer observes the tenant context of the task driving the pipeline.
#[must_use]
pub fn build_data_pipeline(
    store: MemoryStore,
    registry: Arc<PolicyRegistry>,
    config: &ServerConfig,
) -> DataPipeline {
    let svc = ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer::from_millis(config.default_operation_timeout_ms))
        .layer(MetricsLayer::new(Arc::clone(&registry)))
        .layer(ScopingLayer::new(registry))
        .service(store);
    BoxCloneSyncService::new(svc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
