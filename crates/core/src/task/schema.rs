//! Task node field schema
//!
//! The allow-list of task node fields with the JSON shape each one must have.
//! Validation reports every violation on a node, not just the first.

use super::TaskNode;
use crate::error::FieldViolation;
use chrono::DateTime;
use serde_json::Value as JsonValue;

/// Expected JSON shape of a task node field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// String with at least one non-whitespace character
    NonEmptyString,
    /// Any string
    String,
    /// Any number
    Number,
    /// String or number (e.g. "30 minutes" or 30)
    StringOrNumber,
    /// Boolean
    Bool,
    /// Array of non-empty id strings
    IdList,
    /// JSON object
    Object,
    /// RFC 3339 string or integer epoch milliseconds
    Timestamp,
}

impl FieldKind {
    /// Human-readable description used in violations
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::NonEmptyString => "a non-empty string",
            FieldKind::String => "a string",
            FieldKind::Number => "a number",
            FieldKind::StringOrNumber => "a string or number",
            FieldKind::Bool => "a boolean",
            FieldKind::IdList => "an array of id strings",
            FieldKind::Object => "an object",
            FieldKind::Timestamp => "an RFC 3339 timestamp or epoch milliseconds",
        }
    }

    /// Check a value against this kind
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            FieldKind::NonEmptyString | FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::StringOrNumber => value.is_string() || value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::IdList => value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|i| i.as_str().is_some_and(|s| !s.trim().is_empty()))
            }),
            FieldKind::Object => value.is_object(),
            FieldKind::Timestamp => match value {
                JsonValue::String(s) => DateTime::parse_from_rfc3339(s).is_ok(),
                JsonValue::Number(n) => n.is_i64() || n.is_u64(),
                _ => false,
            },
        }
    }
}

/// One allow-listed field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Field name as it appears in the node
    pub name: &'static str,
    /// Expected shape
    pub kind: FieldKind,
    /// Must be present on every node
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
    }
}

/// The task node allow-list
pub const TASK_NODE_FIELDS: &[FieldSpec] = &[
    field("id", FieldKind::NonEmptyString, true),
    field("title", FieldKind::NonEmptyString, true),
    field("description", FieldKind::String, false),
    field("difficulty", FieldKind::Number, false),
    field("duration", FieldKind::StringOrNumber, false),
    field("branch", FieldKind::String, false),
    field("priority", FieldKind::Number, false),
    field("prerequisites", FieldKind::IdList, false),
    field("completed", FieldKind::Bool, false),
    field("generated", FieldKind::Bool, false),
    field("similarity", FieldKind::Number, false),
    field("metadata", FieldKind::Object, false),
    field("created", FieldKind::Timestamp, false),
    field("lastUpdated", FieldKind::Timestamp, false),
];

/// Fields every caller may write regardless of its declared scope
pub const ALWAYS_WRITABLE: &[&str] = &["id", "prerequisites"];

/// Look up a field in the allow-list
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    TASK_NODE_FIELDS.iter().find(|f| f.name == name)
}

/// True if `name` is allow-listed
pub fn is_allowed_field(name: &str) -> bool {
    field_spec(name).is_some()
}

/// True if `name` bypasses write-scope checks
pub fn is_always_writable(name: &str) -> bool {
    ALWAYS_WRITABLE.contains(&name)
}

/// Structural validation of a node against the allow-list.
///
/// Reports missing required fields first (in allow-list order), then
/// per-field problems in key order. `null` is never an accepted value.
pub fn validate_node(node: &TaskNode) -> Vec<FieldViolation> {
    let mut violations: Vec<FieldViolation> = TASK_NODE_FIELDS
        .iter()
        .filter(|spec| spec.required && node.get(spec.name).is_none())
        .map(|spec| FieldViolation::Missing {
            field: spec.name.to_string(),
        })
        .collect();

    for (name, value) in node.fields() {
        let Some(spec) = field_spec(name) else {
            violations.push(FieldViolation::UnknownField {
                field: name.clone(),
            });
            continue;
        };

        if !spec.kind.accepts(value) {
            violations.push(FieldViolation::WrongType {
                field: name.clone(),
                expected: spec.kind.describe(),
            });
        } else if spec.kind == FieldKind::NonEmptyString
            && value.as_str().is_some_and(|s| s.trim().is_empty())
        {
            violations.push(FieldViolation::Empty {
                field: name.clone(),
            });
        }
    }

    violations
}
