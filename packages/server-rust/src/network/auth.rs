//! Bearer token authentication.
//!
//! [`authenticate`] runs as axum middleware. A valid `Authorization: Bearer`
//! token becomes an [`AuthenticatedPrincipal`] in the request extensions,
//! where [`TenantContextLayer`](super::tenant::TenantContextLayer) picks it
//! up. Requests without the header continue unauthenticated; routes that
//! touch tenant data add [`require_principal`] to refuse them. A header that is
//! present but malformed, expired, or badly signed is answered with 401.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tenantry_core::{AuthenticatedPrincipal, TenantId};
use tracing::debug;

use super::config::AuthConfig;

/// JWT payload accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub platform_operator: bool,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

impl Claims {
    #[must_use]
    pub fn into_principal(self) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            id: self.sub,
            tenant_id: self.tenant_id.map(TenantId::from),
            platform_operator: self.platform_operator,
        }
    }
}

/// Reasons a request's credentials were refused.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authorization header is not a bearer token")]
    MalformedHeader,
    #[error("bearer tokens are not accepted by this server")]
    NotConfigured,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("a bearer token is required")]
    MissingCredentials,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "unauthorized",
            "message": self.to_string(),
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Verifies HS256-signed tokens against a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for a bad signature, an expired
    /// token, or a payload that is not [`Claims`].
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.key, &self.validation)?.claims)
    }
}

/// Shared state of the [`authenticate`] middleware.
#[derive(Clone, Default)]
pub struct Authenticator {
    verifier: Option<Arc<JwtVerifier>>,
}

impl Authenticator {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            verifier: config
                .jwt_secret
                .as_deref()
                .map(|secret| Arc::new(JwtVerifier::new(secret, config.leeway_secs))),
        }
    }

    /// Resolves the principal for an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// See [`AuthError`].
    pub fn principal(&self, header: &str) -> Result<AuthenticatedPrincipal, AuthError> {
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MalformedHeader)?;
        let verifier = self.verifier.as_ref().ok_or(AuthError::NotConfigured)?;
        Ok(verifier.verify(token)?.into_principal())
    }
}

/// Axum middleware: attaches the caller's [`AuthenticatedPrincipal`].
///
/// # Errors
///
/// Returns [`AuthError`] (rendered as 401) when an `Authorization` header is
/// present but cannot be verified.
pub async fn authenticate(
    State(auth): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return Ok(next.run(request).await);
    };
    let header = header.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let principal = auth.principal(header).inspect_err(|err| {
        debug!(error = %err, "rejecting request credentials");
    })?;
    debug!(
        principal = principal.id.as_str(),
        tenant_id = principal.tenant_id.as_ref().map(TenantId::as_str),
        "authenticated request"
    );
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Axum middleware: refuses requests [`authenticate`] left anonymous.
///
/// # Errors
///
/// Returns [`AuthError::MissingCredentials`] (rendered as 401) when the
/// request carries no [`AuthenticatedPrincipal`].
pub async fn require_principal(request: Request, next: Next) -> Result<Response, AuthError> {
    if request.extensions().get::<AuthenticatedPrincipal>().is_none() {
        debug!(path = request.uri().path(), "rejecting anonymous request");
        return Err(AuthError::MissingCredentials);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::body::Body;
    use axum::middleware::{from_fn, from_fn_with_state};
    use axum::routing::get;
    use axum::Router;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    use super::*;

    pub(crate) const SECRET: &str = "test-secret";

    /// Signs `claims` with [`SECRET`].
    pub(crate) fn token(tenant: Option<&str>, operator: bool) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 3600;
        sign(&Claims {
            sub: "user-1".to_string(),
            tenant_id: tenant.map(str::to_string),
            platform_operator: operator,
            exp,
        })
    }

    pub(crate) fn sign(claims: &Claims) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn authenticator() -> Authenticator {
        Authenticator::from_config(&AuthConfig {
            jwt_secret: Some(SECRET.to_string()),
            leeway_secs: 0,
        })
    }

    #[test]
    fn valid_token_yields_principal() {
        let header = format!("Bearer {}", token(Some("acme"), false));
        let principal = authenticator().principal(&header).unwrap();
        assert_eq!(principal.id, "user-1");
        assert_eq!(principal.tenant_id, Some(TenantId::from("acme")));
        assert!(!principal.platform_operator);
    }

    #[test]
    fn operator_flag_is_carried() {
        let header = format!("Bearer {}", token(None, true));
        let principal = authenticator().principal(&header).unwrap();
        assert!(principal.platform_operator);
        assert!(principal.tenant_id.is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let header = format!(
            "Bearer {}",
            sign(&Claims {
                sub: "user-1".to_string(),
                tenant_id: Some("acme".to_string()),
                platform_operator: false,
                exp: 1,
            })
        );
        assert!(matches!(
            authenticator().principal(&header),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = Authenticator::from_config(&AuthConfig {
            jwt_secret: Some("another-secret".to_string()),
            leeway_secs: 0,
        });
        let header = format!("Bearer {}", token(Some("acme"), false));
        assert!(matches!(
            other.principal(&header),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn non_bearer_header_is_malformed() {
        assert!(matches!(
            authenticator().principal("Basic dXNlcjpwYXNz"),
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            authenticator().principal("Bearer "),
            Err(AuthError::MalformedHeader)
        ));
    }

    #[test]
    fn tokens_refused_without_secret() {
        let header = format!("Bearer {}", token(Some("acme"), false));
        assert!(matches!(
            Authenticator::default().principal(&header),
            Err(AuthError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn anonymous_request_is_refused_when_principal_required() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(require_principal));
        let response = router
            .oneshot(axum::http::Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_request_passes_principal_check() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(require_principal))
            .layer(from_fn_with_state(authenticator(), authenticate));
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .header(
                        AUTHORIZATION,
                        format!("Bearer {}", token(Some("acme"), false)),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
