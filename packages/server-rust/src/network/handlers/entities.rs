//! Entity operation endpoints.
//!
//! `POST /entities/{entity}/operations` accepts one JSON-encoded
//! [`Operation`] and runs it through the data pipeline under the request's
//! tenant context. Callers without a tenant are limited to entity types that
//! are not tenant-scoped, unless they are platform operators.

use axum::extract::{Path, State};
use axum::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tenantry_core::{AuthenticatedPrincipal, Operation, TenantContext};

use super::AppState;
use crate::service::{DataError, OperationOutput};
use crate::storage::EntityRepository;

/// [`DataError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DataError);

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            DataError::UnknownEntity { .. } => (StatusCode::NOT_FOUND, "unknown_entity"),
            DataError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
            DataError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            DataError::Overloaded => (StatusCode::SERVICE_UNAVAILABLE, "overloaded"),
            DataError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid_operation"),
            DataError::Validation { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            DataError::Internal(err) => {
                tracing::error!(error = %err, "data operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        let body = json!({
            "error": code,
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Runs one operation against `entity`.
///
/// # Errors
///
/// [`DataError::Forbidden`] for a tenantless caller on a tenant-scoped
/// entity, otherwise any [`DataError`] from the pipeline. [`ApiError`] maps
/// them to a status.
pub async fn operation_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedPrincipal>,
    Path(entity): Path<String>,
    Json(operation): Json<Operation>,
) -> Result<Json<OperationOutput>, ApiError> {
    let ctx = TenantContext::from_caller(Some(&principal));
    let unbound = !ctx.is_privileged_cross_tenant && ctx.scoping_tenant().is_none();
    if unbound && state.registry.tenant_field(&entity).is_some() {
        tracing::warn!(
            principal = principal.id.as_str(),
            entity = entity.as_str(),
            "tenantless caller refused on tenant-scoped entity"
        );
        return Err(DataError::Forbidden { entity }.into());
    }
    let repository = EntityRepository::new(entity, state.data);
    Ok(Json(repository.execute(operation).await?))
}

#[derive(Debug, Serialize)]
pub struct EntitySummary {
    pub name: String,
    /// Field rows are scoped on, or `null` for shared entity types.
    pub tenant_field: Option<String>,
}

/// Lists registered entity types and how each is scoped.
pub async fn list_entities_handler(State(state): State<AppState>) -> Json<Vec<EntitySummary>> {
    let mut entities: Vec<EntitySummary> = state
        .registry
        .entities()
        .map(|name| EntitySummary {
            name: name.to_string(),
            tenant_field: state.registry.tenant_field(name).map(str::to_string),
        })
        .collect();
    entities.sort_by(|a, b| a.name.cmp(&b.name));
    Json(entities)
}
