//! Typed per-entity access over the data pipeline.
//!
//! Every call goes through the full middleware stack, so a repository used
//! inside a request is scoped to that request's tenant without any extra
//! arguments.

use anyhow::anyhow;
use tenantry_core::{
    Document, Filter, FindOptions, Operation, ScopedOperation, Stage, Update, Value,
};
use tower::ServiceExt;

use crate::service::middleware::DataPipeline;
use crate::service::operation::{DataError, OperationOutput};

/// Rows affected by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Data access for one entity type.
#[derive(Clone)]
pub struct EntityRepository {
    entity: String,
    pipeline: DataPipeline,
}

impl EntityRepository {
    #[must_use]
    pub fn new(entity: impl Into<String>, pipeline: DataPipeline) -> Self {
        Self {
            entity: entity.into(),
            pipeline,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Sends `operation` for this entity through the pipeline.
    ///
    /// # Errors
    ///
    /// Whatever the pipeline returns; see [`DataError`].
    pub async fn execute(&self, operation: Operation) -> Result<OperationOutput, DataError> {
        self.pipeline
            .clone()
            .oneshot(ScopedOperation::new(self.entity.clone(), operation))
            .await
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn find_one(&self, filter: Filter) -> Result<Option<Document>, DataError> {
        match self.execute(Operation::FindOne { filter }).await? {
            OperationOutput::Document(doc) => Ok(doc),
            other => Err(unexpected("find_one", &other)),
        }
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn find_many(
        &self,
        filter: Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, DataError> {
        let out = self.execute(Operation::FindMany { filter, options }).await?;
        into_documents("find_many", out)
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn count(&self, filter: Filter) -> Result<u64, DataError> {
        match self.execute(Operation::Count { filter }).await? {
            OperationOutput::Count(n) => Ok(n),
            other => Err(unexpected("count", &other)),
        }
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn aggregate(&self, pipeline: Vec<Stage>) -> Result<Vec<Document>, DataError> {
        let out = self.execute(Operation::Aggregate { pipeline }).await?;
        into_documents("aggregate", out)
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn update_one(
        &self,
        filter: Filter,
        update: Update,
    ) -> Result<UpdateResult, DataError> {
        let out = self.execute(Operation::UpdateOne { filter, update }).await?;
        into_update("update_one", out)
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn update_many(
        &self,
        filter: Filter,
        update: Update,
    ) -> Result<UpdateResult, DataError> {
        let out = self.execute(Operation::UpdateMany { filter, update }).await?;
        into_update("update_many", out)
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn delete_one(&self, filter: Filter) -> Result<u64, DataError> {
        let out = self.execute(Operation::DeleteOne { filter }).await?;
        into_deleted("delete_one", out)
    }

    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn delete_many(&self, filter: Filter) -> Result<u64, DataError> {
        let out = self.execute(Operation::DeleteMany { filter }).await?;
        into_deleted("delete_many", out)
    }

    /// Stores `documents` and returns their ids in input order.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<Value>, DataError> {
        match self.execute(Operation::Insert { documents }).await? {
            OperationOutput::Inserted { ids } => Ok(ids),
            other => Err(unexpected("insert", &other)),
        }
    }
}

fn unexpected(kind: &str, output: &OperationOutput) -> DataError {
    DataError::Internal(anyhow!(
        "{kind} returned unexpected `{}` output",
        output.label()
    ))
}

fn into_documents(kind: &str, output: OperationOutput) -> Result<Vec<Document>, DataError> {
    match output {
        OperationOutput::Documents(docs) => Ok(docs),
        other => Err(unexpected(kind, &other)),
    }
}

fn into_update(kind: &str, output: OperationOutput) -> Result<UpdateResult, DataError> {
    match output {
        OperationOutput::Updated { matched, modified } => Ok(UpdateResult { matched, modified }),
        other => Err(unexpected(kind, &other)),
    }
}

fn into_deleted(kind: &str, output: OperationOutput) -> Result<u64, DataError> {
    match output {
        OperationOutput::Deleted { deleted } => Ok(deleted),
        other => Err(unexpected(kind, &other)),
    }
}
