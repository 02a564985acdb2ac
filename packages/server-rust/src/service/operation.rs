//! Results and errors of data operations flowing through the pipeline.

use serde::Serialize;
use tenantry_core::{Document, Value};

/// Successful result of a data operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutput {
    /// `find_one`: the first matching row, if any.
    Document(Option<Document>),
    /// `find_many` and `aggregate`.
    Documents(Vec<Document>),
    Count(u64),
    Updated { matched: u64, modified: u64 },
    Deleted { deleted: u64 },
    /// `insert`: the `id` of each stored document, in input order.
    Inserted { ids: Vec<Value> },
}

impl OperationOutput {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Document(_) => "document",
            Self::Documents(_) => "documents",
            Self::Count(_) => "count",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
            Self::Inserted { .. } => "inserted",
        }
    }
}

/// Errors returned by the data pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("unknown entity type: {entity}")]
    UnknownEntity { entity: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("caller has no tenant and cannot access tenant-scoped entity {entity}")]
    Forbidden { entity: String },
    #[error("invalid operation: {0}")]
    Invalid(String),
    #[error("document rejected: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
