//! Tenantry Core: tenant context, ambient context store, scoping policy, and
//! the query scoping interceptor.

pub mod context;
pub mod eval;
pub mod interceptor;
pub mod policy;
pub mod propagate;
pub mod query;
pub mod schema;
pub mod store;
pub mod types;

pub use context::{AuthenticatedPrincipal, TenantContext};
pub use interceptor::{QueryScopingInterceptor, ScopingOutcome};
pub use policy::{
    EntityRegistration, PolicyRegistry, PolicyRegistryBuilder, RegistrationError, ScopingPolicy,
    DEFAULT_TENANT_FIELD,
};
pub use propagate::propagate;
pub use query::{
    Condition, Filter, FindOptions, Operation, OperationKind, Operators, ScopedOperation,
    SortDirection, SortKey, Stage, Update,
};
pub use schema::{EntitySchema, FieldDef, ValidationResult};
pub use types::{document, Document, TenantId, Value};
