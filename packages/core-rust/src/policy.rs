//! Scoping policy configuration and the per-entity registration table.
//!
//! Registrations are collected in a [`PolicyRegistryBuilder`] at startup and
//! frozen into a [`PolicyRegistry`]; nothing can be added or changed after
//! [`build`](PolicyRegistryBuilder::build). Misconfiguration that would leave
//! an entity silently unscoped is rejected with a [`RegistrationError`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::schema::EntitySchema;

/// Field holding the owning tenant when none is configured.
pub const DEFAULT_TENANT_FIELD: &str = "tenant_id";

/// Installation-wide scoping configuration, attached to each registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingPolicy {
    /// Field on each entity type holding its owning tenant id.
    #[serde(default = "default_tenant_field")]
    pub tenant_field: String,
    /// When non-empty, only these entity types are scoped. When empty, every
    /// entity type declaring `tenant_field` is.
    #[serde(default)]
    pub entity_allow_list: BTreeSet<String>,
}

fn default_tenant_field() -> String {
    DEFAULT_TENANT_FIELD.to_string()
}

impl Default for ScopingPolicy {
    fn default() -> Self {
        Self {
            tenant_field: default_tenant_field(),
            entity_allow_list: BTreeSet::new(),
        }
    }
}

impl ScopingPolicy {
    #[must_use]
    pub fn with_tenant_field(mut self, field: impl Into<String>) -> Self {
        self.tenant_field = field.into();
        self
    }

    #[must_use]
    pub fn allow<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_allow_list
            .extend(entities.into_iter().map(Into::into));
        self
    }

    /// Whether the allow-list admits `entity` (an empty list admits all).
    #[must_use]
    pub fn admits(&self, entity: &str) -> bool {
        self.entity_allow_list.is_empty() || self.entity_allow_list.contains(entity)
    }
}

/// Configuration mistakes detected while registering entity types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("entity `{entity}` is selected for tenant scoping but declares no `{field}` field")]
    MissingTenantField { entity: String, field: String },
    #[error("entity `{entity}` is already registered")]
    DuplicateEntity { entity: String },
    #[error("scoping policy for `{entity}` has an empty tenant field name")]
    EmptyTenantField { entity: String },
    #[error("allow-list names `{entity}`, which was never registered")]
    UnknownAllowListEntry { entity: String },
}

/// Frozen registration for one entity type.
#[derive(Debug, Clone)]
pub struct EntityRegistration {
    schema: EntitySchema,
    policy: Arc<ScopingPolicy>,
    scoped: bool,
}

impl EntityRegistration {
    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    #[must_use]
    pub fn policy(&self) -> &ScopingPolicy {
        &self.policy
    }

    /// The tenant field to scope on, or `None` when this entity type is not
    /// in scope for its policy.
    #[must_use]
    pub fn tenant_field(&self) -> Option<&str> {
        self.scoped.then_some(self.policy.tenant_field.as_str())
    }
}

/// Collects entity registrations during startup.
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    default_policy: Arc<ScopingPolicy>,
    entries: HashMap<String, EntityRegistration>,
}

impl PolicyRegistryBuilder {
    /// Starts a builder whose [`register`](Self::register) calls use `policy`.
    #[must_use]
    pub fn new(policy: ScopingPolicy) -> Self {
        Self {
            default_policy: Arc::new(policy),
            entries: HashMap::new(),
        }
    }

    /// Registers `schema` under the builder's installation policy.
    ///
    /// # Errors
    ///
    /// See [`register_with`](Self::register_with).
    pub fn register(&mut self, schema: EntitySchema) -> Result<&mut Self, RegistrationError> {
        let policy = Arc::clone(&self.default_policy);
        self.insert(schema, policy)
    }

    /// Registers `schema` under its own `policy`.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::MissingTenantField`] if the allow-list names
    ///   this entity but its schema lacks the tenant field.
    /// - [`RegistrationError::DuplicateEntity`] on a second registration.
    /// - [`RegistrationError::EmptyTenantField`] for a blank field name.
    pub fn register_with(
        &mut self,
        schema: EntitySchema,
        policy: ScopingPolicy,
    ) -> Result<&mut Self, RegistrationError> {
        self.insert(schema, Arc::new(policy))
    }

    fn insert(
        &mut self,
        schema: EntitySchema,
        policy: Arc<ScopingPolicy>,
    ) -> Result<&mut Self, RegistrationError> {
        let entity = schema.name.clone();
        if policy.tenant_field.is_empty() {
            return Err(RegistrationError::EmptyTenantField { entity });
        }
        if self.entries.contains_key(&entity) {
            return Err(RegistrationError::DuplicateEntity { entity });
        }

        let declares = schema.declares(&policy.tenant_field);
        let explicitly_selected = policy.entity_allow_list.contains(&entity);
        if explicitly_selected && !declares {
            return Err(RegistrationError::MissingTenantField {
                entity,
                field: policy.tenant_field.clone(),
            });
        }
        let scoped = declares && policy.admits(&entity);

        info!(
            entity = entity.as_str(),
            tenant_field = policy.tenant_field.as_str(),
            scoped,
            "registered entity type"
        );
        self.entries.insert(
            entity,
            EntityRegistration {
                schema,
                policy,
                scoped,
            },
        );
        Ok(self)
    }

    /// Freezes the registrations.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::UnknownAllowListEntry`] if any policy's
    /// allow-list names an entity type that was never registered, since that
    /// entity would otherwise go unscoped without notice.
    pub fn build(self) -> Result<PolicyRegistry, RegistrationError> {
        let policies = std::iter::once(&self.default_policy)
            .chain(self.entries.values().map(|e| &e.policy));
        for policy in policies {
            if let Some(missing) = policy
                .entity_allow_list
                .iter()
                .find(|name| !self.entries.contains_key(*name))
            {
                return Err(RegistrationError::UnknownAllowListEntry {
                    entity: missing.clone(),
                });
            }
        }
        Ok(PolicyRegistry {
            entries: self.entries,
        })
    }
}

/// Read-only table of entity registrations, shared as `Arc<PolicyRegistry>`.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    entries: HashMap<String, EntityRegistration>,
}

impl PolicyRegistry {
    #[must_use]
    pub fn builder(policy: ScopingPolicy) -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::new(policy)
    }

    #[must_use]
    pub fn get(&self, entity: &str) -> Option<&EntityRegistration> {
        self.entries.get(entity)
    }

    /// Tenant field for `entity` if it is registered and in scope.
    #[must_use]
    pub fn tenant_field(&self, entity: &str) -> Option<&str> {
        self.get(entity).and_then(EntityRegistration::tenant_field)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> EntitySchema {
        EntitySchema::new("Invoice")
            .required_field("tenant_id")
            .field("amount")
    }

    fn currency() -> EntitySchema {
        EntitySchema::new("Currency").field("code")
    }

    #[test]
    fn empty_allow_list_scopes_entities_declaring_the_field() {
        let mut builder = PolicyRegistry::builder(ScopingPolicy::default());
        builder.register(invoice()).unwrap();
        builder.register(currency()).unwrap();
        let registry = builder.build().unwrap();

        assert_eq!(registry.tenant_field("Invoice"), Some("tenant_id"));
        assert_eq!(registry.tenant_field("Currency"), None);
        assert_eq!(registry.tenant_field("Unregistered"), None);
    }

    #[test]
    fn allow_list_excludes_unlisted_entities() {
        let policy = ScopingPolicy::default().allow(["Invoice"]);
        let mut builder = PolicyRegistry::builder(policy);
        builder
            .register(invoice())
            .unwrap()
            .register(EntitySchema::new("AuditLog").field("tenant_id"))
            .unwrap();
        let registry = builder.build().unwrap();

        assert_eq!(registry.tenant_field("Invoice"), Some("tenant_id"));
        assert_eq!(registry.tenant_field("AuditLog"), None);
    }

    #[test]
    fn allow_listed_entity_without_tenant_field_is_rejected() {
        let policy = ScopingPolicy::default().allow(["Currency"]);
        let mut builder = PolicyRegistry::builder(policy);
        let err = builder.register(currency()).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::MissingTenantField {
                entity: "Currency".to_string(),
                field: "tenant_id".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = PolicyRegistry::builder(ScopingPolicy::default());
        builder.register(invoice()).unwrap();
        assert!(matches!(
            builder.register(invoice()),
            Err(RegistrationError::DuplicateEntity { .. })
        ));
    }

    #[test]
    fn blank_tenant_field_is_rejected() {
        let mut builder = PolicyRegistry::builder(ScopingPolicy::default());
        let err = builder
            .register_with(invoice(), ScopingPolicy::default().with_tenant_field(""))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyTenantField { .. }));
    }

    #[test]
    fn allow_list_typo_fails_at_build() {
        let policy = ScopingPolicy::default().allow(["Invoice", "Invoices"]);
        let mut builder = PolicyRegistry::builder(policy);
        builder.register(invoice()).unwrap();
        assert_eq!(
            builder.build().unwrap_err(),
            RegistrationError::UnknownAllowListEntry {
                entity: "Invoices".to_string(),
            }
        );
    }

    #[test]
    fn per_entity_policy_uses_its_own_field() {
        let mut builder = PolicyRegistry::builder(ScopingPolicy::default());
        builder
            .register_with(
                EntitySchema::new("Disbursement").field("company_id"),
                ScopingPolicy::default().with_tenant_field("company_id"),
            )
            .unwrap();
        let registry = builder.build().unwrap();
        assert_eq!(registry.tenant_field("Disbursement"), Some("company_id"));
        assert_eq!(
            registry.get("Disbursement").unwrap().policy().tenant_field,
            "company_id"
        );
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: ScopingPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ScopingPolicy::default());
    }
}
