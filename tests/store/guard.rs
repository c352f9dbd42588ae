//! Guarded task tree mutations through the public API

use forest_store::{
    FieldViolation, MutationGuard, StoreError, TaskNode, TaskTree, TreeHandle, WriteScopes,
};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;

fn piano_tree() -> TaskTree {
    let mut tree = TaskTree::new("Learn piano");
    tree.push(
        TaskNode::new("scales", "Learn scales")
            .with("branch", "technique")
            .with("difficulty", 2),
    );
    tree
}

fn scopes() -> Arc<WriteScopes> {
    Arc::new(
        WriteScopes::new()
            .with_scope("generate_tasks", ["title", "description", "branch", "priority"])
            .with_scope("complete_task", ["completed", "lastUpdated"]),
    )
}

#[test]
fn generated_tasks_within_scope_are_kept() {
    let guard = MutationGuard::with_scopes(scopes());
    let mut tree = piano_tree();

    let generate = guard.guard("generate_tasks", |tree: &mut TaskTree, count: usize| {
        for i in 0..count {
            tree.push(
                TaskNode::new(format!("song-{}", i), format!("Play song {}", i))
                    .with("branch", "repertoire")
                    .with("prerequisites", vec!["scales"]),
            );
        }
        tree.len()
    });

    assert_eq!(generate(&mut tree, 3).unwrap(), 4);
    assert!(tree.contains("song-2"));
    assert_eq!(tree.get("song-0").unwrap().prerequisites(), vec!["scales"]);
}

#[test]
fn one_bad_node_rolls_back_the_whole_call() {
    let guard = MutationGuard::with_scopes(scopes());
    let mut tree = piano_tree();
    let before = tree.clone();

    let err = guard
        .run("generate_tasks", &mut tree, |tree| {
            tree.push(TaskNode::new("chords", "Learn chords"));
            tree.push(TaskNode::new("arpeggios", "Arpeggios").with("duration", 4));
        })
        .unwrap_err();

    let StoreError::StructuralWrite(err) = err else {
        panic!("expected a structural write error");
    };
    assert_eq!(err.function, "generate_tasks");
    assert_eq!(err.node_id.as_deref(), Some("arpeggios"));
    assert_eq!(
        err.violations,
        vec![FieldViolation::OutOfScope {
            field: "duration".to_string()
        }]
    );
    assert_eq!(tree, before);
    assert!(!tree.contains("chords"));
}

#[test]
fn completing_existing_tasks_is_not_revalidated() {
    let guard = MutationGuard::with_scopes(scopes());
    let mut tree = piano_tree();

    let completed = guard
        .run("complete_task", &mut tree, |tree| {
            let done = tree.mark_completed("scales");
            if let Some(node) = tree.get_mut("scales") {
                node.set("lastUpdated", "2026-01-01T00:00:00Z");
            }
            done
        })
        .unwrap();
    assert!(completed);
    assert!(tree.get("scales").unwrap().is_completed());
}

#[test]
fn undeclared_function_may_write_any_known_field() {
    let guard = MutationGuard::with_scopes(scopes());
    let mut tree = piano_tree();

    guard
        .run("import_tasks", &mut tree, |tree| {
            tree.push(
                TaskNode::new("theory", "Music theory")
                    .with("difficulty", 3)
                    .with("duration", "10h"),
            );
        })
        .unwrap();
    assert!(tree.contains("theory"));

    let err = guard
        .run("import_tasks", &mut tree, |tree| {
            tree.push(TaskNode::new("x", "X").with("color", "red"));
        })
        .unwrap_err();
    assert!(err.is_validation_error());
    assert!(!tree.contains("x"));
}

#[test]
fn invalid_field_types_are_reported() {
    let guard = MutationGuard::new();
    let mut tree = piano_tree();

    let err = guard
        .run("generate_tasks", &mut tree, |tree| {
            tree.push(
                TaskNode::new("t2", "Sight reading")
                    .with("prerequisites", json!("scales"))
                    .with("completed", json!("no")),
            );
        })
        .unwrap_err();
    let StoreError::StructuralWrite(err) = err else {
        panic!("expected a structural write error");
    };
    let mut fields = err.offending_fields();
    fields.sort();
    assert_eq!(fields, vec!["completed", "prerequisites"]);
}

#[tokio::test]
async fn async_mutation_keeps_side_effects_outside_the_tree() {
    let guard = MutationGuard::with_scopes(scopes());
    let handle: TreeHandle = Arc::new(RwLock::new(piano_tree()));
    let log = Arc::new(RwLock::new(Vec::<String>::new()));

    let calls = Arc::clone(&log);
    let result = guard
        .run_async("generate_tasks", &handle, |tree| async move {
            calls.write().push("generated".to_string());
            tokio::task::yield_now().await;
            tree.write()
                .push(TaskNode::new("duets", "Play duets").with("difficulty", 4));
        })
        .await;

    assert!(result.is_err());
    assert_eq!(handle.read().len(), 1);
    assert_eq!(log.read().as_slice(), ["generated".to_string()]);
}
