//! In-memory entity store backed by [`DashMap`].
//!
//! Executes [`ScopedOperation`]s exactly as they arrive; it knows nothing
//! about tenants. Scoping happens upstream in the
//! [`ScopingLayer`](crate::service::middleware::ScopingLayer).

use std::collections::BTreeMap;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use tenantry_core::eval::{run_pipeline, sort_documents};
use tenantry_core::{
    Document, EntityRegistration, Filter, FindOptions, Operation, PolicyRegistry,
    ScopedOperation, Update, ValidationResult, Value,
};
use tower::Service;
use tracing::trace;

use crate::service::operation::{DataError, OperationOutput};

/// Field every stored document is keyed by. Generated on insert when absent.
pub const ID_FIELD: &str = "id";

/// Rows of one entity type, in insertion order.
type Table = BTreeMap<u64, Document>;

/// Concurrent in-memory store for every registered entity type.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct MemoryStore {
    registry: Arc<PolicyRegistry>,
    tables: Arc<DashMap<String, Table>>,
    next_seq: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Creates an empty store accepting the entity types in `registry`.
    #[must_use]
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self {
            registry,
            tables: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Number of stored rows for `entity`, across all tenants.
    #[must_use]
    pub fn len(&self, entity: &str) -> usize {
        self.tables.get(entity).map_or(0, |t| t.len())
    }

    #[must_use]
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    /// Runs `op` synchronously against the tables.
    ///
    /// # Errors
    ///
    /// - [`DataError::UnknownEntity`] if the entity type was never registered.
    /// - [`DataError::Invalid`] for updates without assignments.
    /// - [`DataError::Validation`] if an inserted document misses a required field.
    pub fn execute(&self, op: ScopedOperation) -> Result<OperationOutput, DataError> {
        let ScopedOperation { entity, operation } = op;
        let registration = self
            .registry
            .get(&entity)
            .ok_or_else(|| DataError::UnknownEntity {
                entity: entity.clone(),
            })?;
        trace!(entity = entity.as_str(), kind = operation.kind().as_str(), "executing");

        match operation {
            Operation::FindOne { filter } => Ok(OperationOutput::Document(
                self.read(&entity, |rows| {
                    rows.values().find(|d| filter.matches(d)).cloned()
                }),
            )),
            Operation::FindMany { filter, options } => Ok(OperationOutput::Documents(
                self.read(&entity, |rows| find_many(rows, &filter, &options)),
            )),
            Operation::Count { filter } => Ok(OperationOutput::Count(self.read(&entity, |rows| {
                rows.values().filter(|d| filter.matches(d)).count() as u64
            }))),
            Operation::Aggregate { pipeline } => Ok(OperationOutput::Documents(self.read(
                &entity,
                |rows| run_pipeline(rows.values().cloned().collect(), &pipeline),
            ))),
            Operation::UpdateOne { filter, update } => self.update(&entity, &filter, &update, 1),
            Operation::UpdateMany { filter, update } => {
                self.update(&entity, &filter, &update, usize::MAX)
            }
            Operation::DeleteOne { filter } => Ok(self.delete(&entity, &filter, 1)),
            Operation::DeleteMany { filter } => Ok(self.delete(&entity, &filter, usize::MAX)),
            Operation::Insert { documents } => self.insert(registration, documents),
        }
    }

    fn read<T>(&self, entity: &str, f: impl FnOnce(&Table) -> T) -> T {
        match self.tables.get(entity) {
            Some(rows) => f(rows.value()),
            None => f(&Table::new()),
        }
    }

    fn update(
        &self,
        entity: &str,
        filter: &Filter,
        update: &Update,
        limit: usize,
    ) -> Result<OperationOutput, DataError> {
        if update.is_empty() {
            return Err(DataError::Invalid("update has no assignments".to_string()));
        }
        let (mut matched, mut modified) = (0u64, 0u64);
        if let Some(mut rows) = self.tables.get_mut(entity) {
            for doc in rows.values_mut().filter(|d| filter.matches(d)).take(limit) {
                matched += 1;
                if update.apply(doc) {
                    modified += 1;
                }
            }
        }
        Ok(OperationOutput::Updated { matched, modified })
    }

    fn delete(&self, entity: &str, filter: &Filter, limit: usize) -> OperationOutput {
        let mut deleted = 0u64;
        if let Some(mut rows) = self.tables.get_mut(entity) {
            let doomed: Vec<u64> = rows
                .iter()
                .filter(|(_, d)| filter.matches(d))
                .take(limit)
                .map(|(seq, _)| *seq)
                .collect();
            for seq in doomed {
                rows.remove(&seq);
                deleted += 1;
            }
        }
        OperationOutput::Deleted { deleted }
    }

    fn insert(
        &self,
        registration: &EntityRegistration,
        mut documents: Vec<Document>,
    ) -> Result<OperationOutput, DataError> {
        let schema = registration.schema();
        let errors: Vec<String> = documents
            .iter()
            .filter_map(|doc| match schema.validate(doc) {
                ValidationResult::Valid => None,
                ValidationResult::Invalid { errors } => Some(errors),
            })
            .flatten()
            .collect();
        if !errors.is_empty() {
            return Err(DataError::Validation { errors });
        }

        let mut ids = Vec::with_capacity(documents.len());
        let mut rows = self.tables.entry(schema.name.clone()).or_default();
        for mut doc in documents.drain(..) {
            let id = doc
                .entry(ID_FIELD.to_string())
                .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()))
                .clone();
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            rows.insert(seq, doc);
            ids.push(id);
        }
        Ok(OperationOutput::Inserted { ids })
    }
}

fn find_many(rows: &Table, filter: &Filter, options: &FindOptions) -> Vec<Document> {
    let mut out: Vec<Document> = rows.values().filter(|d| filter.matches(d)).cloned().collect();
    sort_documents(&mut out, &options.sort);
    out.into_iter()
        .skip(options.skip.unwrap_or(0))
        .take(options.limit.unwrap_or(usize::MAX))
        .collect()
}

impl Service<ScopedOperation> for MemoryStore {
    type Response = OperationOutput;
    type Error = DataError;
    type Future = Ready<Result<OperationOutput, DataError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: ScopedOperation) -> Self::Future {
        ready(self.execute(op))
    }
}
