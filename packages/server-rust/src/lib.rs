//! `Tenantry` Server: HTTP surface and tenant-scoped data pipeline.
//!
//! - [`network`]: axum router, bearer authentication, per-request tenant
//!   context binding, lifecycle
//! - [`service`]: tower middleware stack around the store (load shedding,
//!   timeout, metrics, tenant scoping)
//! - [`storage`]: in-memory entity store and typed repositories

pub mod network;
pub mod service;
pub mod storage;

pub use network::NetworkModule;
pub use service::{build_data_pipeline, DataError, DataPipeline, OperationOutput, ServerConfig};
pub use storage::{EntityRepository, MemoryStore};
