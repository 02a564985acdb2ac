//! Tower middleware layers for the data pipeline.
//!
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`timeout`]: Per-operation timeout enforcement
//! - [`metrics`]: Operation timing and counting via `tracing` spans and `metrics`
//! - [`scoping`]: Tenant scoping through the `QueryScopingInterceptor`
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod scoping;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_data_pipeline, DataPipeline};
pub use scoping::ScopingLayer;
pub use timeout::TimeoutLayer;
