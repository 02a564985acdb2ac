//! Tenant scoping applied to each data operation before it executes.
//!
//! [`QueryScopingInterceptor::apply`] reads the ambient [`TenantContext`] and,
//! for a non-privileged tenant-bound caller touching an in-scope entity type,
//! narrows the operation to that tenant:
//!
//! - filter operations (find, update, delete, count) gain a
//!   `tenant_field == tenant` condition,
//! - aggregate pipelines gain a leading `match` stage on the tenant field,
//! - inserted documents lacking the tenant field are stamped with it.
//!
//! A tenant condition the caller already supplied is never overwritten, even
//! when it names a different tenant. Such operations are logged at `warn` so
//! the call site can be reviewed.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::TenantContext;
use crate::policy::PolicyRegistry;
use crate::query::{Condition, Filter, Operation, ScopedOperation, Stage};
use crate::store;
use crate::types::{Document, TenantId, Value};

/// What the interceptor did to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopingOutcome {
    /// No context bound on this execution path.
    NoContext,
    /// A context is bound but carries no (or an empty) tenant id.
    NoTenant,
    /// Caller is a privileged cross-tenant operator.
    Privileged,
    /// Entity type is unregistered, lacks the tenant field, or is excluded by
    /// the allow-list.
    OutOfScope,
    /// The caller already constrained the tenant field; left untouched.
    ExplicitTenantFilter,
    /// A tenant condition or leading `match` stage was added.
    Scoped,
    /// One or more inserted documents were given the tenant field.
    Stamped,
}

impl ScopingOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoContext => "no_context",
            Self::NoTenant => "no_tenant",
            Self::Privileged => "privileged",
            Self::OutOfScope => "out_of_scope",
            Self::ExplicitTenantFilter => "explicit_tenant_filter",
            Self::Scoped => "scoped",
            Self::Stamped => "stamped",
        }
    }

    /// Whether the operation was rewritten.
    #[must_use]
    pub fn modified(self) -> bool {
        matches!(self, Self::Scoped | Self::Stamped)
    }
}

/// Enforcement point shared by every entity type's data path.
#[derive(Debug, Clone)]
pub struct QueryScopingInterceptor {
    registry: Arc<PolicyRegistry>,
}

impl QueryScopingInterceptor {
    #[must_use]
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Scopes `op` against the ambient context from [`store::current`].
    pub fn apply(&self, op: &mut ScopedOperation) -> ScopingOutcome {
        self.apply_with(store::current().as_ref(), op)
    }

    /// Scopes `op` against an explicitly supplied context.
    pub fn apply_with(
        &self,
        ctx: Option<&TenantContext>,
        op: &mut ScopedOperation,
    ) -> ScopingOutcome {
        let Some(ctx) = ctx else {
            return ScopingOutcome::NoContext;
        };
        if ctx.is_privileged_cross_tenant {
            return ScopingOutcome::Privileged;
        }
        let Some(tenant) = ctx.scoping_tenant() else {
            return ScopingOutcome::NoTenant;
        };
        let Some(field) = self.registry.tenant_field(&op.entity) else {
            return ScopingOutcome::OutOfScope;
        };

        let entity = op.entity.as_str();
        let outcome = match &mut op.operation {
            Operation::Aggregate { pipeline } => scope_pipeline(pipeline, field, tenant),
            Operation::Insert { documents } => stamp_documents(entity, documents, field, tenant),
            other => match other.filter_mut() {
                Some(filter) => scope_filter(entity, filter, field, tenant),
                None => ScopingOutcome::OutOfScope,
            },
        };
        debug!(
            entity,
            kind = op.operation.kind().as_str(),
            tenant_id = tenant.as_str(),
            outcome = outcome.as_str(),
            "tenant scoping applied"
        );
        outcome
    }
}

fn scope_filter(entity: &str, filter: &mut Filter, field: &str, tenant: &TenantId) -> ScopingOutcome {
    let tenant_value = Value::from(tenant);
    if filter.constrains(field) {
        let differs = filter
            .fields
            .get(field)
            .is_some_and(|cond| !cond.matches(Some(&tenant_value)));
        if differs {
            warn!(
                entity,
                tenant_id = tenant.as_str(),
                "operation filters on another tenant; explicit condition left in place"
            );
        }
        return ScopingOutcome::ExplicitTenantFilter;
    }
    *filter = std::mem::take(filter).with(field, Condition::Equals(tenant_value));
    ScopingOutcome::Scoped
}

fn scope_pipeline(pipeline: &mut Vec<Stage>, field: &str, tenant: &TenantId) -> ScopingOutcome {
    if pipeline.iter().any(|stage| stage.constrains(field)) {
        return ScopingOutcome::ExplicitTenantFilter;
    }
    pipeline.insert(0, Stage::Match(Filter::eq(field, tenant)));
    ScopingOutcome::Scoped
}

fn stamp_documents(
    entity: &str,
    documents: &mut [Document],
    field: &str,
    tenant: &TenantId,
) -> ScopingOutcome {
    let tenant_value = Value::from(tenant);
    let mut stamped = false;
    for doc in documents.iter_mut() {
        match doc.get(field) {
            None => {
                doc.insert(field.to_string(), tenant_value.clone());
                stamped = true;
            }
            Some(existing) if !existing.loosely_eq(&tenant_value) => {
                warn!(
                    entity,
                    tenant_id = tenant.as_str(),
                    "insert carries another tenant's id; left in place"
                );
            }
            Some(_) => {}
        }
    }
    if stamped {
        ScopingOutcome::Stamped
    } else {
        ScopingOutcome::ExplicitTenantFilter
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::eval::run_pipeline;
    use crate::policy::ScopingPolicy;
    use crate::query::{FindOptions, SortKey, Update};
    use crate::schema::EntitySchema;
    use crate::types::document;

    fn registry(policy: ScopingPolicy) -> Arc<PolicyRegistry> {
        let mut builder = PolicyRegistry::builder(policy);
        builder
            .register(EntitySchema::new("Invoice").required_field("tenant_id").field("id"))
            .unwrap()
            .register(EntitySchema::new("AuditLog").field("tenant_id"))
            .unwrap()
            .register(EntitySchema::new("Currency").field("code"))
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    fn interceptor() -> QueryScopingInterceptor {
        QueryScopingInterceptor::new(registry(ScopingPolicy::default()))
    }

    fn find_many(entity: &str, filter: Filter) -> ScopedOperation {
        ScopedOperation::new(
            entity,
            Operation::FindMany {
                filter,
                options: FindOptions::default(),
            },
        )
    }

    fn tenant_a() -> TenantContext {
        TenantContext::for_tenant("A")
    }

    #[test]
    fn adds_tenant_condition_to_every_filter_kind() {
        let scoper = interceptor();
        let ops = vec![
            Operation::FindOne { filter: Filter::all() },
            Operation::FindMany {
                filter: Filter::eq("status", "open"),
                options: FindOptions::default(),
            },
            Operation::UpdateOne {
                filter: Filter::all(),
                update: Update::set("status", "paid"),
            },
            Operation::UpdateMany {
                filter: Filter::all(),
                update: Update::set("status", "paid"),
            },
            Operation::DeleteOne { filter: Filter::all() },
            Operation::DeleteMany { filter: Filter::all() },
            Operation::Count { filter: Filter::all() },
        ];
        for operation in ops {
            let mut op = ScopedOperation::new("Invoice", operation);
            let outcome = scoper.apply_with(Some(&tenant_a()), &mut op);
            assert_eq!(outcome, ScopingOutcome::Scoped, "{:?}", op.kind());
            let filter = op.operation.filter().unwrap();
            assert_eq!(filter.fields["tenant_id"], Condition::eq("A"));
        }
    }

    #[test]
    fn existing_conditions_are_kept_alongside_tenant() {
        let mut op = find_many("Invoice", Filter::eq("status", "open"));
        interceptor().apply_with(Some(&tenant_a()), &mut op);
        let filter = op.operation.filter().unwrap();
        assert_eq!(filter.fields.len(), 2);
        assert_eq!(filter.fields["status"], Condition::eq("open"));
    }

    #[test]
    fn privileged_context_is_left_untouched() {
        let mut op = find_many("Invoice", Filter::all());
        let original = op.clone();
        let ctx = TenantContext::privileged(Some(TenantId::from("A")));
        assert_eq!(
            interceptor().apply_with(Some(&ctx), &mut op),
            ScopingOutcome::Privileged
        );
        assert_eq!(op, original);
    }

    #[test]
    fn explicit_tenant_filter_takes_precedence() {
        for filter in [
            Filter::eq("tenant_id", "B"),
            Filter::eq("tenant_id", "A"),
            Filter::all().with("tenant_id", Condition::exists(true)),
            Filter::all().and(Filter::eq("tenant_id", "B")),
        ] {
            let mut op = find_many("Invoice", filter);
            let original = op.clone();
            assert_eq!(
                interceptor().apply_with(Some(&tenant_a()), &mut op),
                ScopingOutcome::ExplicitTenantFilter
            );
            assert_eq!(op, original);
        }
    }

    #[test]
    fn partial_disjunction_on_tenant_is_still_scoped() {
        let filter = Filter::all().or(vec![
            Filter::eq("tenant_id", "B"),
            Filter::eq("status", "open"),
        ]);
        let mut op = find_many("Invoice", filter);
        assert_eq!(
            interceptor().apply_with(Some(&tenant_a()), &mut op),
            ScopingOutcome::Scoped
        );
    }

    #[test]
    fn no_context_leaves_every_entity_untouched() {
        let scoper = interceptor();
        for entity in ["Invoice", "AuditLog", "Currency", "Unknown"] {
            let mut op = find_many(entity, Filter::all());
            let original = op.clone();
            assert_eq!(scoper.apply(&mut op), ScopingOutcome::NoContext);
            assert_eq!(op, original);
        }
    }

    #[test]
    fn empty_or_missing_tenant_is_not_scoped() {
        let scoper = interceptor();
        for ctx in [TenantContext::default(), TenantContext::for_tenant("")] {
            let mut op = find_many("Invoice", Filter::all());
            assert_eq!(scoper.apply_with(Some(&ctx), &mut op), ScopingOutcome::NoTenant);
            assert!(op.operation.filter().unwrap().is_empty());
        }
    }

    #[test]
    fn entity_without_tenant_field_is_never_scoped() {
        let mut op = find_many("Currency", Filter::all());
        assert_eq!(
            interceptor().apply_with(Some(&tenant_a()), &mut op),
            ScopingOutcome::OutOfScope
        );
    }

    #[test]
    fn allow_list_excludes_unlisted_entity() {
        let scoper =
            QueryScopingInterceptor::new(registry(ScopingPolicy::default().allow(["Invoice"])));
        let mut audit = find_many("AuditLog", Filter::all());
        assert_eq!(
            scoper.apply_with(Some(&tenant_a()), &mut audit),
            ScopingOutcome::OutOfScope
        );
        assert!(audit.operation.filter().unwrap().is_empty());

        let mut invoice = find_many("Invoice", Filter::all());
        assert_eq!(
            scoper.apply_with(Some(&tenant_a()), &mut invoice),
            ScopingOutcome::Scoped
        );
    }

    #[test]
    fn aggregate_gets_leading_match_stage() {
        let caller_stages = vec![
            Stage::Group {
                by: "status".to_string(),
                count_as: "n".to_string(),
            },
            Stage::Sort(vec![SortKey::desc("n")]),
        ];
        let mut op = ScopedOperation::new(
            "Invoice",
            Operation::Aggregate {
                pipeline: caller_stages.clone(),
            },
        );
        assert_eq!(
            interceptor().apply_with(Some(&tenant_a()), &mut op),
            ScopingOutcome::Scoped
        );
        let Operation::Aggregate { pipeline } = &op.operation else {
            panic!("expected aggregate");
        };
        assert_eq!(pipeline[0], Stage::Match(Filter::eq("tenant_id", "A")));
        assert_eq!(&pipeline[1..], caller_stages.as_slice());
    }

    #[test]
    fn aggregate_with_tenant_match_anywhere_is_untouched() {
        let pipeline = vec![
            Stage::Sort(vec![SortKey::asc("id")]),
            Stage::Match(Filter::eq("tenant_id", "B")),
        ];
        let mut op = ScopedOperation::new("Invoice", Operation::Aggregate { pipeline });
        let original = op.clone();
        assert_eq!(
            interceptor().apply_with(Some(&tenant_a()), &mut op),
            ScopingOutcome::ExplicitTenantFilter
        );
        assert_eq!(op, original);
    }

    #[test]
    fn insert_stamps_only_documents_missing_the_field() {
        let mut op = ScopedOperation::new(
            "Invoice",
            Operation::Insert {
                documents: vec![document([("id", "1")]), document([("id", "2"), ("tenant_id", "B")])],
            },
        );
        assert_eq!(
            interceptor().apply_with(Some(&tenant_a()), &mut op),
            ScopingOutcome::Stamped
        );
        let Operation::Insert { documents } = &op.operation else {
            panic!("expected insert");
        };
        assert_eq!(documents[0]["tenant_id"], Value::from("A"));
        assert_eq!(documents[1]["tenant_id"], Value::from("B"));
    }

    #[test]
    fn apply_reads_ambient_context() {
        let scoper = interceptor();
        let mut op = find_many("Invoice", Filter::all());
        let outcome = store::sync_scope(tenant_a(), || scoper.apply(&mut op));
        assert_eq!(outcome, ScopingOutcome::Scoped);
    }

    #[test]
    fn invoice_example_scenario() {
        let rows = vec![
            document([("tenant_id", "A"), ("id", "1")]),
            document([("tenant_id", "B"), ("id", "2")]),
        ];
        let scoper = interceptor();
        let run = |ctx: TenantContext, filter: Filter| {
            let mut op = find_many("Invoice", filter);
            store::sync_scope(ctx, || scoper.apply(&mut op));
            let filter = op.operation.filter().unwrap().clone();
            run_pipeline(rows.clone(), &[Stage::Match(filter)])
        };

        assert_eq!(run(tenant_a(), Filter::all()), vec![rows[0].clone()]);
        assert_eq!(
            run(TenantContext::privileged(Some(TenantId::from("A"))), Filter::all()),
            rows
        );
        assert_eq!(
            run(tenant_a(), Filter::eq("tenant_id", "B")),
            vec![rows[1].clone()]
        );
    }

    fn arb_rows() -> impl Strategy<Value = Vec<Document>> {
        prop::collection::vec(
            (prop::sample::select(vec!["A", "B", "C"]), prop::sample::select(vec!["open", "paid"])),
            0..40,
        )
        .prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(tenant, status)| document([("tenant_id", tenant), ("status", status)]))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn scoped_reads_only_return_active_tenant_rows(
            rows in arb_rows(),
            tenant in prop::sample::select(vec!["A", "B", "C"]),
            status in prop::option::of(prop::sample::select(vec!["open", "paid"])),
        ) {
            let filter = status.map_or_else(Filter::all, |s| Filter::eq("status", s));
            let mut op = find_many("Invoice", filter.clone());
            interceptor().apply_with(Some(&TenantContext::for_tenant(tenant)), &mut op);
            let scoped = op.operation.filter().unwrap().clone();

            let got = run_pipeline(rows.clone(), &[Stage::Match(scoped)]);
            let expected: Vec<Document> = rows
                .into_iter()
                .filter(|d| d["tenant_id"] == Value::from(tenant) && filter.matches(d))
                .collect();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn explicit_tenant_filter_is_never_altered(
            active in prop::sample::select(vec!["A", "B", "C"]),
            requested in prop::sample::select(vec!["A", "B", "C"]),
        ) {
            let mut op = find_many("Invoice", Filter::eq("tenant_id", requested));
            let original = op.clone();
            let outcome = interceptor().apply_with(Some(&TenantContext::for_tenant(active)), &mut op);
            prop_assert_eq!(outcome, ScopingOutcome::ExplicitTenantFilter);
            prop_assert_eq!(op, original);
        }
    }
}
