//! Structured metadata filters.
//!
//! Supports: eq, ne, gt, gte, lt, lte, in, and/or/not logic. Filters are
//! produced by the self-query stage as JSON and evaluated against a
//! document's [`DocumentMetadata`].

use crate::models::{DocumentMetadata, FieldValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A filter condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: FieldValue },
    Ne { field: String, value: FieldValue },
    Gt { field: String, value: FieldValue },
    Gte { field: String, value: FieldValue },
    Lt { field: String, value: FieldValue },
    Lte { field: String, value: FieldValue },
    In { field: String, values: Vec<FieldValue> },
    And { conds: Vec<Filter> },
    Or { conds: Vec<Filter> },
    Not { cond: Box<Filter> },
}

impl Filter {
    pub fn eq(field: &str, value: FieldValue) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value,
        }
    }

    /// Evaluate the filter against a document's metadata.
    ///
    /// A comparison on a field the document does not carry (e.g. `day` on a
    /// summary) never matches.
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        match self {
            Filter::Eq { field, value } => equals(metadata, field, value),
            Filter::Ne { field, value } => match compare(metadata, field, value) {
                Some(ord) => ord != Ordering::Equal,
                None => metadata.field(field).is_none(),
            },
            Filter::Gt { field, value } => compare(metadata, field, value) == Some(Ordering::Greater),
            Filter::Gte { field, value } => matches!(
                compare(metadata, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lt { field, value } => compare(metadata, field, value) == Some(Ordering::Less),
            Filter::Lte { field, value } => matches!(
                compare(metadata, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::In { field, values } => values
                .iter()
                .any(|v| equals(metadata, field, v)),
            Filter::And { conds } | Filter::Or { conds } if conds.is_empty() => true,
            Filter::And { conds } => conds.iter().all(|f| f.matches(metadata)),
            Filter::Or { conds } => conds.iter().any(|f| f.matches(metadata)),
            Filter::Not { cond } => !cond.matches(metadata),
        }
    }

    /// Every attribute name referenced anywhere in the tree.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Eq { field, .. }
            | Filter::Ne { field, .. }
            | Filter::Gt { field, .. }
            | Filter::Gte { field, .. }
            | Filter::Lt { field, .. }
            | Filter::Lte { field, .. }
            | Filter::In { field, .. } => out.push(field.as_str()),
            Filter::And { conds } | Filter::Or { conds } => {
                for c in conds {
                    c.collect_fields(out);
                }
            }
            Filter::Not { cond } => cond.collect_fields(out),
        }
    }
}

fn equals(metadata: &DocumentMetadata, field: &str, value: &FieldValue) -> bool {
    metadata
        .field(field)
        .map_or(false, |stored| stored.loosely_equals(value))
}

fn compare(metadata: &DocumentMetadata, field: &str, value: &FieldValue) -> Option<Ordering> {
    metadata.field(field)?.compare(value)
}
