//! HTTP handler definitions for the `Tenantry` server.
//!
//! Defines `AppState` (the shared state carried through axum extractors) and
//! re-exports all handler functions for building the router.

pub mod entities;
pub mod health;

pub use entities::{list_entities_handler, operation_handler, ApiError};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use tenantry_core::PolicyRegistry;

use super::{NetworkConfig, ShutdownController};
use crate::service::DataPipeline;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and the cloneable pipeline so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Scoped data pipeline every entity operation goes through.
    pub data: DataPipeline,
    /// Registered entity types.
    pub registry: Arc<PolicyRegistry>,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
