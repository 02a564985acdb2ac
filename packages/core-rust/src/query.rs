//! Data operation model: filters, aggregation stages, updates, and the
//! [`ScopedOperation`] view the scoping interceptor amends before dispatch.
//!
//! Filters use a Mongo-like JSON shape so the HTTP boundary can accept them
//! verbatim:
//!
//! ```json
//! { "status": "approved", "amount": { "$gte": 100 }, "$or": [ ... ] }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{Document, Value};

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operators applied to a single field. All present operators
/// must hold for the condition to match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operators {
    #[serde(rename = "$eq", skip_serializing_if = "Option::is_none", default)]
    pub eq: Option<Value>,
    #[serde(rename = "$ne", skip_serializing_if = "Option::is_none", default)]
    pub ne: Option<Value>,
    #[serde(rename = "$in", skip_serializing_if = "Option::is_none", default)]
    pub any_of: Option<Vec<Value>>,
    #[serde(rename = "$nin", skip_serializing_if = "Option::is_none", default)]
    pub none_of: Option<Vec<Value>>,
    #[serde(rename = "$gt", skip_serializing_if = "Option::is_none", default)]
    pub gt: Option<Value>,
    #[serde(rename = "$gte", skip_serializing_if = "Option::is_none", default)]
    pub gte: Option<Value>,
    #[serde(rename = "$lt", skip_serializing_if = "Option::is_none", default)]
    pub lt: Option<Value>,
    #[serde(rename = "$lte", skip_serializing_if = "Option::is_none", default)]
    pub lte: Option<Value>,
    #[serde(rename = "$exists", skip_serializing_if = "Option::is_none", default)]
    pub exists: Option<bool>,
}

impl Operators {
    /// True when no operator is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Condition on one field: either an operator object or a bare value, which
/// is shorthand for equality.
///
/// An empty object (`{"field": {}}`) is equality with an empty map, not an
/// operator set that matches everything.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Operators(Operators),
    Equals(Value),
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Operators(Operators),
            Equals(Value),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Operators(ops) if ops.is_empty() => {
                Condition::Equals(Value::Map(BTreeMap::new()))
            }
            Repr::Operators(ops) => Condition::Operators(ops),
            Repr::Equals(value) => Condition::Equals(value),
        })
    }
}

impl Condition {
    pub fn eq(value: impl Into<Value>) -> Self {
        Condition::Equals(value.into())
    }

    #[must_use]
    pub fn one_of(values: Vec<Value>) -> Self {
        Condition::Operators(Operators {
            any_of: Some(values),
            ..Operators::default()
        })
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Condition::Operators(Operators {
            ne: Some(value.into()),
            ..Operators::default()
        })
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Condition::Operators(Operators {
            gte: Some(value.into()),
            ..Operators::default()
        })
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Condition::Operators(Operators {
            lt: Some(value.into()),
            ..Operators::default()
        })
    }

    #[must_use]
    pub fn exists(present: bool) -> Self {
        Condition::Operators(Operators {
            exists: Some(present),
            ..Operators::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Row filter for reads, writes, deletes, and `match` stages.
///
/// Top-level field conditions and `$and` branches are conjunctive; `$or`
/// branches are disjunctive. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "$and", skip_serializing_if = "Vec::is_empty", default)]
    pub all_of: Vec<Filter>,
    #[serde(rename = "$or", skip_serializing_if = "Vec::is_empty", default)]
    pub any_of: Vec<Filter>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Condition>,
}

impl Filter {
    /// Filter that matches every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Single equality condition.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().with(field, Condition::eq(value))
    }

    /// Adds (or replaces) the condition on `field`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.fields.insert(field.into(), condition);
        self
    }

    #[must_use]
    pub fn and(mut self, other: Filter) -> Self {
        self.all_of.push(other);
        self
    }

    #[must_use]
    pub fn or(mut self, branches: Vec<Filter>) -> Self {
        self.any_of.extend(branches);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.all_of.is_empty() && self.any_of.is_empty()
    }

    /// Whether this filter already restricts `field`, whatever the value.
    ///
    /// True for a top-level condition, for any `$and` branch that constrains
    /// it, or for a non-empty `$or` whose every branch constrains it. A lone
    /// `$or` branch naming the field is not enough, since rows could still
    /// match through the other branches.
    #[must_use]
    pub fn constrains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
            || self.all_of.iter().any(|f| f.constrains(field))
            || (!self.any_of.is_empty() && self.any_of.iter().all(|f| f.constrains(field)))
    }
}

// ---------------------------------------------------------------------------
// Sorting, updates, and aggregation stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Paging and ordering for multi-row reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sort: Vec<SortKey>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub limit: Option<usize>,
}

/// Field assignments applied to every matched row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "$set", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub set: Document,
    #[serde(rename = "$unset", skip_serializing_if = "Vec::is_empty", default)]
    pub unset: Vec<String>,
}

impl Update {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut update = Self::default();
        update.set.insert(field.into(), value.into());
        update
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

/// One stage of an aggregation pipeline. Stages run in order, each over the
/// previous stage's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Keep rows matching the filter.
    Match(Filter),
    Sort(Vec<SortKey>),
    Skip(usize),
    Limit(usize),
    /// Keep only the listed fields.
    Project(Vec<String>),
    /// One output row per distinct value of `by`, holding that value under
    /// `by` and the number of input rows under `count_as`.
    Group { by: String, count_as: String },
}

impl Stage {
    /// Whether this stage is a `match` that already restricts `field`.
    #[must_use]
    pub fn constrains(&self, field: &str) -> bool {
        matches!(self, Stage::Match(filter) if filter.constrains(field))
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Discriminant of [`Operation`], used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FindOne,
    FindMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Count,
    Aggregate,
    Insert,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FindOne => "find_one",
            Self::FindMany => "find_many",
            Self::UpdateOne => "update_one",
            Self::UpdateMany => "update_many",
            Self::DeleteOne => "delete_one",
            Self::DeleteMany => "delete_many",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
            Self::Insert => "insert",
        }
    }
}

/// A data operation about to execute against one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    FindOne {
        #[serde(default)]
        filter: Filter,
    },
    FindMany {
        #[serde(default)]
        filter: Filter,
        #[serde(default)]
        options: FindOptions,
    },
    UpdateOne {
        #[serde(default)]
        filter: Filter,
        update: Update,
    },
    UpdateMany {
        #[serde(default)]
        filter: Filter,
        update: Update,
    },
    DeleteOne {
        #[serde(default)]
        filter: Filter,
    },
    DeleteMany {
        #[serde(default)]
        filter: Filter,
    },
    Count {
        #[serde(default)]
        filter: Filter,
    },
    Aggregate {
        pipeline: Vec<Stage>,
    },
    Insert {
        documents: Vec<Document>,
    },
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::FindOne { .. } => OperationKind::FindOne,
            Operation::FindMany { .. } => OperationKind::FindMany,
            Operation::UpdateOne { .. } => OperationKind::UpdateOne,
            Operation::UpdateMany { .. } => OperationKind::UpdateMany,
            Operation::DeleteOne { .. } => OperationKind::DeleteOne,
            Operation::DeleteMany { .. } => OperationKind::DeleteMany,
            Operation::Count { .. } => OperationKind::Count,
            Operation::Aggregate { .. } => OperationKind::Aggregate,
            Operation::Insert { .. } => OperationKind::Insert,
        }
    }

    /// The row filter, for every kind that has one.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Operation::FindOne { filter }
            | Operation::FindMany { filter, .. }
            | Operation::UpdateOne { filter, .. }
            | Operation::UpdateMany { filter, .. }
            | Operation::DeleteOne { filter }
            | Operation::DeleteMany { filter }
            | Operation::Count { filter } => Some(filter),
            Operation::Aggregate { .. } | Operation::Insert { .. } => None,
        }
    }

    pub fn filter_mut(&mut self) -> Option<&mut Filter> {
        match self {
            Operation::FindOne { filter }
            | Operation::FindMany { filter, .. }
            | Operation::UpdateOne { filter, .. }
            | Operation::UpdateMany { filter, .. }
            | Operation::DeleteOne { filter }
            | Operation::DeleteMany { filter }
            | Operation::Count { filter } => Some(filter),
            Operation::Aggregate { .. } | Operation::Insert { .. } => None,
        }
    }
}

/// Uniform view over a pending operation: its target entity type and the
/// operation itself, amended in place by the scoping interceptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedOperation {
    pub entity: String,
    pub operation: Operation,
}

impl ScopedOperation {
    pub fn new(entity: impl Into<String>, operation: Operation) -> Self {
        Self {
            entity: entity.into(),
            operation,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}
