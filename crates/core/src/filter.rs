//! Metadata filtering for vector queries
//!
//! Supports only equality filtering on top-level metadata fields.
//! The same filter is evaluated locally by the embedded provider and
//! translated into a `where` clause for the server-backed provider.

use crate::metadata::{Metadata, MetadataValue};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Metadata filter for queries (equality only, AND semantics)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    /// Top-level field equality conditions
    pub equals: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    /// Create an empty filter (matches all)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Check if metadata matches this filter
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| values_equal(expected, actual))
        })
    }

    /// Check if filter is empty (matches all)
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// Get the number of conditions in the filter
    pub fn len(&self) -> usize {
        self.equals.len()
    }

    /// Translate into a Chroma-style `where` clause.
    ///
    /// Returns `None` for an empty filter; a single condition is sent bare,
    /// several are wrapped in `$and`.
    pub fn to_where_clause(&self) -> Option<JsonValue> {
        let mut clauses: Vec<JsonValue> = self
            .equals
            .iter()
            .map(|(k, v)| {
                let mut clause = Map::new();
                clause.insert(k.clone(), v.to_json());
                JsonValue::Object(clause)
            })
            .collect();
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(json!({ "$and": clauses })),
        }
    }
}

fn values_equal(expected: &MetadataValue, actual: &MetadataValue) -> bool {
    match (expected.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => match (expected.as_str(), actual.as_str()) {
            (Some(a), Some(b)) => a == b,
            _ => expected.as_bool().is_some() && expected.as_bool() == actual.as_bool(),
        },
    }
}
