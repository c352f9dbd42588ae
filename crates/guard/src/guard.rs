//! Guarded task tree mutations
//!
//! A guarded mutation runs against the live tree. Afterwards every node whose
//! id was not present before is validated; on any violation the tree is
//! restored from the pre-call snapshot. Only the tree is rolled back: side
//! effects the mutation had elsewhere survive.

use crate::scope::WriteScopes;
use forest_core::{
    is_allowed_field, is_always_writable, validate_node, FieldViolation, StoreResult,
    StructuralWriteError, TaskTree,
};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared tree for async mutations
pub type TreeHandle = Arc<RwLock<TaskTree>>;

/// Validates nodes introduced by a mutation and rolls back on violation
#[derive(Debug, Clone, Default)]
pub struct MutationGuard {
    scopes: Arc<WriteScopes>,
}

impl MutationGuard {
    /// Guard with no declared scopes
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard over a scope registry
    pub fn with_scopes(scopes: Arc<WriteScopes>) -> Self {
        Self { scopes }
    }

    /// Scope registry
    pub fn scopes(&self) -> &Arc<WriteScopes> {
        &self.scopes
    }

    /// Wrap `f` so every call is guarded. `function` selects the write scope.
    pub fn guard<A, T, F>(
        &self,
        function: impl Into<String>,
        f: F,
    ) -> impl Fn(&mut TaskTree, A) -> StoreResult<T>
    where
        F: Fn(&mut TaskTree, A) -> T,
    {
        let guard = self.clone();
        let function = function.into();
        move |tree: &mut TaskTree, args: A| guard.run(&function, tree, |tree| f(tree, args))
    }

    /// Run one guarded mutation
    pub fn run<T, F>(&self, function: &str, tree: &mut TaskTree, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut TaskTree) -> T,
    {
        let snapshot = tree.clone();
        let result = f(tree);
        if let Err(err) = self.check(function, &snapshot, tree) {
            *tree = snapshot;
            return Err(err.into());
        }
        Ok(result)
    }

    /// Run one guarded async mutation over a shared tree.
    ///
    /// `f` receives a clone of the handle and must not hold the lock across
    /// its own await points.
    pub async fn run_async<T, F, Fut>(&self, function: &str, tree: &TreeHandle, f: F) -> StoreResult<T>
    where
        F: FnOnce(TreeHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        let snapshot = tree.read().clone();
        let result = f(Arc::clone(tree)).await;

        let mut current = tree.write();
        if let Err(err) = self.check(function, &snapshot, &current) {
            *current = snapshot;
            return Err(err.into());
        }
        Ok(result)
    }

    fn check(
        &self,
        function: &str,
        before: &TaskTree,
        after: &TaskTree,
    ) -> Result<(), StructuralWriteError> {
        let scope = self.scopes.scope(function);
        let new_nodes = after.new_nodes_since(before);

        for node in &new_nodes {
            let mut violations = validate_node(node);
            if let Some(scope) = &scope {
                violations.extend(
                    node.field_names()
                        .filter(|name| {
                            is_allowed_field(name)
                                && !is_always_writable(name)
                                && !scope.contains(*name)
                        })
                        .map(|name| FieldViolation::OutOfScope {
                            field: name.to_string(),
                        }),
                );
            }

            if !violations.is_empty() {
                let err = StructuralWriteError {
                    function: function.to_string(),
                    node_id: node.id().map(str::to_string),
                    violations,
                };
                warn!(
                    target: "forest::guard",
                    node = ?err.node_id,
                    fields = ?err.offending_fields(),
                    "Rejected task tree mutation, rolled back"
                );
                return Err(err);
            }
        }

        debug!(target: "forest::guard", new_nodes = new_nodes.len(), "Task tree mutation accepted");
        Ok(())
    }
}
