//! In-memory evaluation of filters, updates, and aggregation pipelines over
//! [`Document`]s. Used by the in-memory entity store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::query::{Condition, Filter, Operators, SortDirection, SortKey, Stage, Update};
use crate::types::{Document, Value};

impl Filter {
    /// Whether `doc` satisfies this filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.fields
            .iter()
            .all(|(field, cond)| cond.matches(doc.get(field)))
            && self.all_of.iter().all(|f| f.matches(doc))
            && (self.any_of.is_empty() || self.any_of.iter().any(|f| f.matches(doc)))
    }
}

impl Condition {
    /// Evaluates the condition against a field value; `None` means the field
    /// is absent, which equality treats like `null`.
    #[must_use]
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Condition::Equals(expected) => equals(actual, expected),
            Condition::Operators(ops) if ops.is_empty() => {
                equals(actual, &Value::Map(BTreeMap::new()))
            }
            Condition::Operators(ops) => ops.matches(actual),
        }
    }
}

impl Operators {
    fn matches(&self, actual: Option<&Value>) -> bool {
        if let Some(expected) = &self.eq {
            if !equals(actual, expected) {
                return false;
            }
        }
        if let Some(excluded) = &self.ne {
            if equals(actual, excluded) {
                return false;
            }
        }
        if let Some(candidates) = &self.any_of {
            if !candidates.iter().any(|c| equals(actual, c)) {
                return false;
            }
        }
        if let Some(excluded) = &self.none_of {
            if excluded.iter().any(|c| equals(actual, c)) {
                return false;
            }
        }
        if let Some(present) = self.exists {
            if actual.is_some() != present {
                return false;
            }
        }
        within(actual, self.gt.as_ref(), &[Ordering::Greater])
            && within(actual, self.gte.as_ref(), &[Ordering::Greater, Ordering::Equal])
            && within(actual, self.lt.as_ref(), &[Ordering::Less])
            && within(actual, self.lte.as_ref(), &[Ordering::Less, Ordering::Equal])
    }
}

/// Range check; an absent or incomparable field never satisfies a bound.
fn within(actual: Option<&Value>, bound: Option<&Value>, accepted: &[Ordering]) -> bool {
    match bound {
        None => true,
        Some(bound) => actual
            .and_then(|v| v.compare(bound))
            .is_some_and(|ord| accepted.contains(&ord)),
    }
}

/// Equality as used by filters: absent equals `null`, and an array field
/// matches when any element equals a scalar operand.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => *expected == Value::Null,
        Some(Value::Array(items)) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| item.loosely_eq(expected))
        }
        Some(value) => value.loosely_eq(expected),
    }
}

impl Update {
    /// Applies the assignments to `doc`. Returns `true` if anything changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        for (field, value) in &self.set {
            if doc.get(field) != Some(value) {
                doc.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        for field in &self.unset {
            changed |= doc.remove(field).is_some();
        }
        changed
    }
}

/// Orders documents by `keys`, earlier keys taking precedence. Missing and
/// incomparable values sort first.
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in keys {
            let ord = match (a.get(&key.field), b.get(&key.field)) {
                (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Runs `stages` in order over `docs`.
#[must_use]
pub fn run_pipeline(mut docs: Vec<Document>, stages: &[Stage]) -> Vec<Document> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
            Stage::Sort(keys) => {
                sort_documents(&mut docs, keys);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => docs.into_iter().take(*n).collect(),
            Stage::Project(fields) => docs
                .into_iter()
                .map(|d| {
                    d.into_iter()
                        .filter(|(k, _)| fields.contains(k))
                        .collect()
                })
                .collect(),
            Stage::Group { by, count_as } => group_count(docs, by, count_as),
        };
    }
    docs
}

fn group_count(docs: Vec<Document>, by: &str, count_as: &str) -> Vec<Document> {
    // Keyed by the JSON rendering of the group value; `Value` is not `Ord`.
    let mut groups: BTreeMap<String, (Value, i64)> = BTreeMap::new();
    for doc in docs {
        let value = doc.get(by).cloned().unwrap_or(Value::Null);
        let key = serde_json::to_string(&value).unwrap_or_default();
        groups.entry(key).or_insert((value, 0)).1 += 1;
    }
    groups
        .into_values()
        .map(|(value, count)| {
            let mut out = Document::new();
            out.insert(by.to_string(), value);
            out.insert(count_as.to_string(), Value::Int(count));
            out
        })
        .collect()
}
