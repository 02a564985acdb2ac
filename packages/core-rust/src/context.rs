use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Caller identity produced by the authentication layer.
///
/// Only these three attributes are read when deriving a [`TenantContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    /// Unique identifier for the authenticated entity.
    pub id: String,
    /// Company/organization the caller belongs to, if any.
    pub tenant_id: Option<TenantId>,
    /// Platform-level operator exempt from tenant scoping.
    #[serde(default)]
    pub platform_operator: bool,
}

/// Per-request tenant identity bound for the dynamic extent of one request.
///
/// Never persisted and never shared across requests. See
/// [`store`](crate::store) for how it is bound and looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    /// Tenant scope for isolation. `None` for callers with no tenant affiliation.
    pub tenant_id: Option<TenantId>,
    /// Platform operators see every tenant's rows.
    pub is_privileged_cross_tenant: bool,
    /// Authenticated principal id, carried for traceability only.
    pub caller_id: Option<String>,
}

impl TenantContext {
    /// Context for a regular caller bound to `tenant_id`.
    pub fn for_tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    /// Context for a platform operator. `tenant_id` is kept for traceability
    /// but never used to scope.
    #[must_use]
    pub fn privileged(tenant_id: Option<TenantId>) -> Self {
        Self {
            tenant_id,
            is_privileged_cross_tenant: true,
            caller_id: None,
        }
    }

    /// Derives the context for a request from its (optional) caller.
    ///
    /// An absent caller yields an empty, non-privileged context rather than no
    /// context at all.
    #[must_use]
    pub fn from_caller(caller: Option<&AuthenticatedPrincipal>) -> Self {
        match caller {
            Some(principal) => Self {
                tenant_id: principal.tenant_id.clone(),
                is_privileged_cross_tenant: principal.platform_operator,
                caller_id: Some(principal.id.clone()),
            },
            None => Self::default(),
        }
    }

    /// Records the principal id this context was derived for.
    #[must_use]
    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    /// The tenant this context narrows operations to, if it narrows at all.
    ///
    /// `None` for privileged contexts and for missing or empty tenant ids.
    #[must_use]
    pub fn scoping_tenant(&self) -> Option<&TenantId> {
        if self.is_privileged_cross_tenant {
            return None;
        }
        self.tenant_id.as_ref().filter(|id| !id.is_empty())
    }
}
