//! HTTP surface: configuration, authentication, tenant context binding,
//! handlers, and the server lifecycle.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;
pub mod tenant;

pub use auth::{require_principal, AuthError, Authenticator, Claims, JwtVerifier};
pub use config::{AuthConfig, NetworkConfig};
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
pub use tenant::TenantContextLayer;
