//! Record model: ids, namespaces, vectors and query types
//!
//! A record is the versionless `(id, vector, metadata)` triple. Records that
//! belong to one tree/project share an id prefix `"<owner-id>:"` (the
//! [`Namespace`]); prefix operations never cross that boundary.

use crate::error::{StoreError, StoreResult};
use crate::filter::MetadataFilter;
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Maximum record id length
pub const MAX_RECORD_ID_LENGTH: usize = 1024;

/// Default number of query results
pub const DEFAULT_QUERY_LIMIT: usize = 10;

/// Default minimum similarity for query results
pub const DEFAULT_QUERY_THRESHOLD: f32 = 0.1;

// =============================================================================
// Namespace
// =============================================================================

/// A string-prefix partition of records (`"<owner-id>:"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Separator between owner id and local record id
    pub const SEPARATOR: char = ':';

    /// Build the namespace for an owner id
    pub fn for_owner(owner: &str) -> StoreResult<Self> {
        if owner.is_empty() {
            return Err(StoreError::validation("namespace owner id cannot be empty"));
        }
        if owner.contains(Self::SEPARATOR) {
            return Err(StoreError::validation(format!(
                "namespace owner id '{}' cannot contain '{}'",
                owner,
                Self::SEPARATOR
            )));
        }
        Ok(Namespace(format!("{}{}", owner, Self::SEPARATOR)))
    }

    /// Accept a raw prefix such as `"a:"`
    pub fn parse(prefix: &str) -> StoreResult<Self> {
        match prefix.strip_suffix(Self::SEPARATOR) {
            Some(owner) => Self::for_owner(owner),
            None => Err(StoreError::validation(format!(
                "namespace '{}' must end with '{}'",
                prefix,
                Self::SEPARATOR
            ))),
        }
    }

    /// The full prefix including the separator
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The owner id without the separator
    pub fn owner(&self) -> &str {
        &self.0[..self.0.len() - 1]
    }

    /// Form a record id inside this namespace
    pub fn record_id(&self, local_id: &str) -> String {
        format!("{}{}", self.0, local_id)
    }

    /// True if `id` belongs to this namespace
    pub fn contains(&self, id: &str) -> bool {
        id.starts_with(&self.0)
    }

    /// Namespace of a record id, if the id has one
    pub fn of_record(id: &str) -> Option<Namespace> {
        id.find(Self::SEPARATOR)
            .filter(|&idx| idx > 0)
            .map(|idx| Namespace(id[..=idx].to_string()))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Namespace::parse(&value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

// =============================================================================
// Records
// =============================================================================

/// A stored `(id, vector, metadata)` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within its namespace
    pub id: String,
    /// Embedding
    pub vector: Vec<f32>,
    /// Flat metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// Create a record
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }

    /// Namespace this record belongs to, if any
    pub fn namespace(&self) -> Option<Namespace> {
        Namespace::of_record(&self.id)
    }
}

/// Options for a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Maximum number of results
    pub limit: usize,
    /// Minimum similarity (`1 − distance`) a result must reach
    pub threshold: f32,
    /// Optional metadata equality filter
    pub filter: Option<MetadataFilter>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUERY_LIMIT,
            threshold: DEFAULT_QUERY_THRESHOLD,
            filter: None,
        }
    }
}

impl QueryOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the similarity threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the metadata filter
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// True if a result with this similarity is kept
    pub fn accepts(&self, similarity: f32) -> bool {
        similarity >= self.threshold
    }
}

/// One query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    /// Record id
    pub id: String,
    /// `1 − distance`, higher is more similar
    pub similarity: f32,
    /// Record metadata
    pub metadata: Metadata,
    /// Stored vector, when the backend returned it
    pub vector: Option<Vec<f32>>,
}

/// Convert a backend distance into a similarity score
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}

// =============================================================================
// Validation
// =============================================================================

/// Validate an embedding: non-empty, every component finite
pub fn validate_vector(vector: &[f32]) -> StoreResult<()> {
    if vector.is_empty() {
        return Err(StoreError::validation("vector cannot be empty"));
    }
    if let Some(idx) = vector.iter().position(|v| !v.is_finite()) {
        return Err(StoreError::validation(format!(
            "vector component {} is not a finite number",
            idx
        )));
    }
    Ok(())
}

/// Parse a vector from raw JSON; anything but an array of numbers is rejected
pub fn parse_vector(value: &JsonValue) -> StoreResult<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| StoreError::validation("vector must be an array of numbers"))?;
    let vector = items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_f64().map(|f| f as f32).ok_or_else(|| {
                StoreError::validation(format!("vector element {} is not a number", idx))
            })
        })
        .collect::<StoreResult<Vec<f32>>>()?;
    validate_vector(&vector)?;
    Ok(vector)
}

/// Validate a record id
///
/// # Validation Rules
/// - Cannot be empty
/// - Cannot exceed 1024 characters
/// - Cannot contain null bytes
pub fn validate_record_id(id: &str) -> StoreResult<()> {
    if id.is_empty() {
        return Err(StoreError::validation("record id cannot be empty"));
    }
    if id.len() > MAX_RECORD_ID_LENGTH {
        return Err(StoreError::validation(format!(
            "record id cannot exceed {} characters",
            MAX_RECORD_ID_LENGTH
        )));
    }
    if id.contains('\0') {
        return Err(StoreError::validation("record id cannot contain null bytes"));
    }
    Ok(())
}

/// Validate a collection name
///
/// # Validation Rules
/// - 3 to 63 characters
/// - Only ASCII alphanumerics, '_', '-' and '.'
/// - Must start and end with an alphanumeric character
pub fn validate_collection_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| {
        Err(StoreError::validation(format!(
            "invalid collection name '{}': {}",
            name, reason
        )))
    };

    if name.len() < 3 || name.len() > 63 {
        return invalid("must be between 3 and 63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return invalid("only alphanumerics, '_', '-' and '.' are allowed");
    }
    let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return invalid("must start and end with an alphanumeric character");
    }
    Ok(())
}
