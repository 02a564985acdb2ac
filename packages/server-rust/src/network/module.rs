//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tenantry_core::PolicyRegistry;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::auth::{authenticate, require_principal, Authenticator};
use super::config::NetworkConfig;
use super::handlers::{
    health_handler, list_entities_handler, liveness_handler, operation_handler, readiness_handler,
    AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::{track_in_flight, ShutdownController};
use super::tenant::TenantContextLayer;
use crate::service::DataPipeline;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- allocates shared state (shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
    data: DataPipeline,
    registry: Arc<PolicyRegistry>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, data: DataPipeline, registry: Arc<PolicyRegistry>) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
            data,
            registry,
        }
    }

    /// Shared handle for checking health state or triggering shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health`, `GET /health/live`, `GET /health/ready`
    /// - `GET /entities` -- registered entity types
    /// - `POST /entities/{entity}/operations` -- run one data operation
    ///
    /// Entity routes are wrapped (outermost first) in in-flight tracking,
    /// bearer authentication, a check that refuses anonymous callers, and
    /// tenant context binding. Health routes skip all of these. The HTTP
    /// stack from [`build_http_layers`] wraps everything.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            data: self.data.clone(),
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };
        let authenticator = Authenticator::from_config(&self.config.auth);

        Router::new()
            .route("/entities", get(list_entities_handler))
            .route("/entities/{entity}/operations", post(operation_handler))
            .layer(TenantContextLayer)
            .layer(from_fn(require_principal))
            .layer(from_fn_with_state(authenticator, authenticate))
            .layer(from_fn_with_state(Arc::clone(&self.shutdown), track_in_flight))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener and returns the actual port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = self.config.host.as_str(), port, "TCP listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight work.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);
        let signal = async move {
            shutdown.await;
            controller.trigger_shutdown();
        };

        self.shutdown.set_ready();
        info!("serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("all requests drained");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "drain timeout expired with requests remaining"
            );
        }
        Ok(())
    }
}
