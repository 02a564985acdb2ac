//! Request-boundary adapter that establishes the tenant context.

use std::future::Future;

use tracing::debug;

use crate::context::{AuthenticatedPrincipal, TenantContext};
use crate::store;

/// Derives the [`TenantContext`] for `caller` and runs `next` inside it.
///
/// A context is bound even when `caller` is absent, so code inside `next`
/// sees either "bound with no tenant" or, outside any request, nothing at all.
/// `next`'s output is returned unchanged. Nothing here touches storage.
pub async fn propagate<F>(caller: Option<&AuthenticatedPrincipal>, next: F) -> F::Output
where
    F: Future,
{
    let ctx = TenantContext::from_caller(caller);
    debug!(
        tenant_id = ctx.tenant_id.as_ref().map(|t| t.as_str()),
        caller_id = ctx.caller_id.as_deref(),
        privileged = ctx.is_privileged_cross_tenant,
        "binding tenant context"
    );
    store::scope(ctx, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TenantId;

    fn principal(tenant: Option<&str>, operator: bool) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            id: "u-1".to_string(),
            tenant_id: tenant.map(TenantId::from),
            platform_operator: operator,
        }
    }

    #[tokio::test]
    async fn binds_context_derived_from_caller() {
        let caller = principal(Some("acme"), false);
        let ctx = propagate(Some(&caller), async { store::current() }).await;
        assert_eq!(
            ctx,
            Some(TenantContext {
                tenant_id: Some(TenantId::from("acme")),
                is_privileged_cross_tenant: false,
                caller_id: Some("u-1".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn absent_caller_still_binds_an_empty_context() {
        let ctx = propagate(None, async { store::current() }).await;
        assert_eq!(ctx, Some(TenantContext::default()));
    }

    #[tokio::test]
    async fn operator_flag_is_carried() {
        let caller = principal(None, true);
        let ctx = propagate(Some(&caller), async { store::current() }).await;
        assert!(ctx.unwrap().is_privileged_cross_tenant);
    }

    #[tokio::test]
    async fn returns_next_result_unchanged() {
        let caller = principal(Some("acme"), false);
        let out: Result<u32, &str> = propagate(Some(&caller), async { Err("denied") }).await;
        assert_eq!(out, Err("denied"));
        assert!(store::current().is_none());
    }
}
