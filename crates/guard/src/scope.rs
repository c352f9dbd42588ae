//! Declared write scopes

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Fields one guarded function may write
pub type WriteScope = Arc<BTreeSet<String>>;

/// Registry from guarded function name to its declared write scope.
///
/// A function without a declared scope may write any allow-listed field.
///
/// ```ignore
/// let scopes = WriteScopes::new()
///     .with_scope("generate_tasks", ["title", "description", "branch"])
///     .with_scope("complete_task", ["completed", "lastUpdated"]);
/// ```
#[derive(Debug, Default)]
pub struct WriteScopes {
    scopes: RwLock<HashMap<String, WriteScope>>,
}

impl WriteScopes {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`WriteScopes::declare`]
    pub fn with_scope<I, S>(self, function: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declare(function, fields);
        self
    }

    /// Declare (or replace) the scope of `function`
    pub fn declare<I, S>(&self, function: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        self.scopes.write().insert(function.into(), Arc::new(fields));
    }

    /// Remove a declaration
    pub fn remove(&self, function: &str) -> Option<WriteScope> {
        self.scopes.write().remove(function)
    }

    /// Declared scope of `function`
    pub fn scope(&self, function: &str) -> Option<WriteScope> {
        self.scopes.read().get(function).cloned()
    }

    /// Number of declared scopes
    pub fn len(&self) -> usize {
        self.scopes.read().len()
    }

    /// True if nothing is declared
    pub fn is_empty(&self) -> bool {
        self.scopes.read().is_empty()
    }
}
