//! Role inheritance
//!
//! Each `g*` relation of a model is backed by a [`RoleManager`]: a directed
//! "inherits from" graph, optionally partitioned by domain, whose node
//! comparisons go through a pluggable matching function.
//!
//! # Example
//!
//! ```rust
//! use perm_authz::roles::{DefaultRoleManager, RoleManager};
//!
//! let mut rm = DefaultRoleManager::new(10);
//! rm.add_link("alice", "editor", "");
//! rm.add_link("editor", "viewer", "");
//!
//! assert!(rm.has_link("alice", "viewer", ""));
//! assert_eq!(rm.get_roles("alice", ""), vec!["editor".to_string()]);
//! ```

pub mod manager;
pub mod table;
pub mod types;

#[cfg(test)]
mod tests;

pub use manager::{DefaultRoleManager, RoleManager};
pub use table::{RoleLinkTable, SharedRoleManager};
pub use types::{matching_fn_from_builtin, MatchingFn, DEFAULT_MAX_HIERARCHY_LEVEL};
