//! Data operation pipeline.
//!
//! 1. **Middleware** (`middleware`): Tower layers (load-shedding, timeout,
//!    metrics, tenant scoping)
//! 2. **Results** (`operation`): `OperationOutput` and `DataError`
//! 3. **Configuration** (`config`): `ServerConfig`

pub mod config;
pub mod middleware;
pub mod operation;

pub use config::ServerConfig;
pub use middleware::{build_data_pipeline, DataPipeline};
pub use operation::{DataError, OperationOutput};
