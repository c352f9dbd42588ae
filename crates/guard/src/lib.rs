//! Write-integrity guard for the Forest task tree
//!
//! [`MutationGuard`] wraps functions that add task nodes. New nodes must
//! pass structural validation and stay inside the caller's declared
//! [`WriteScopes`] entry; otherwise the tree is rolled back and a
//! `StructuralWriteError` is returned.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod guard;
pub mod scope;

pub use guard::{MutationGuard, TreeHandle};
pub use scope::{WriteScope, WriteScopes};
