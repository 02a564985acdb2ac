//! Ambient, task-scoped storage for the active [`TenantContext`].
//!
//! The context is bound with [`scope`] for the dynamic extent of one logical
//! request and looked up with [`current`] from anywhere inside it, across any
//! number of `.await` points. The binding lives in a `tokio` task-local, so
//! requests interleaved on the same worker thread never observe each other's
//! context.
//!
//! Tasks spawned with `tokio::spawn` do not inherit task-locals. Work that
//! leaves the request task must go through [`spawn`] or
//! [`ScopedFutureExt::in_current_tenant`].

use std::future::Future;

use futures_util::future::Either;
use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

use crate::context::TenantContext;
use crate::types::TenantId;

tokio::task_local! {
    static CURRENT_CONTEXT: TenantContext;
}

/// Runs `fut` with `ctx` bound as the ambient tenant context.
///
/// Returns whatever `fut` returns, errors included. A nested `scope` shadows
/// the outer context until it completes. Dropping the returned future before
/// completion tears the binding down with it.
pub async fn scope<F>(ctx: TenantContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CONTEXT.scope(ctx, fut).await
}

/// Synchronous counterpart of [`scope`] for bodies that never suspend.
pub fn sync_scope<F, R>(ctx: TenantContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_CONTEXT.sync_scope(ctx, f)
}

/// The context bound by the nearest enclosing [`scope`], if any.
///
/// Absence is a normal state (startup code, background jobs, paths that
/// bypass the request boundary) and is never an error.
#[must_use]
pub fn current() -> Option<TenantContext> {
    CURRENT_CONTEXT.try_with(Clone::clone).ok()
}

/// Shorthand for the bound tenant id, ignoring privilege.
#[must_use]
pub fn current_tenant_id() -> Option<TenantId> {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.tenant_id.clone())
        .ok()
        .flatten()
}

/// Spawns `fut` on the runtime with the caller's context (if any) re-bound
/// inside the new task.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut.in_current_tenant())
}

/// Carries the current tenant context into a future polled elsewhere.
pub trait ScopedFutureExt: Future + Sized {
    /// Captures [`current()`] now and binds it whenever the returned future
    /// is polled. Without a bound context the future runs unscoped.
    fn in_current_tenant(self) -> Either<TaskLocalFuture<TenantContext, Self>, Self>;
}

impl<F: Future> ScopedFutureExt for F {
    fn in_current_tenant(self) -> Either<TaskLocalFuture<TenantContext, Self>, Self> {
        match current() {
            Some(ctx) => Either::Left(CURRENT_CONTEXT.scope(ctx, self)),
            None => Either::Right(self),
        }
    }
}
