//! # PERM Authorization Engine
//!
//! Embeddable access-control engine driven by a declarative PERM model
//! (request, policy, role, matcher and effect definitions) and a table of
//! policy rows.
//!
//! ## Features
//!
//! - **One evaluation algorithm** for ACL, RBAC, RBAC with domains, ABAC and
//!   priority models
//! - **CEL matchers** with built-in `keyMatch*`, `regexMatch`, `ipMatch` and
//!   `globMatch` predicates, plus custom functions
//! - **Role graphs** per relation, domain-scoped, with pluggable pattern
//!   matching and bounded, cycle-safe reachability
//! - **Async adapters** (in-memory, CSV file) with filtered loading
//! - **Watchers** broadcasting policy changes
//!
//! ## Example
//!
//! ```rust
//! use perm_authz::{Enforcer, MemoryAdapter, Model};
//!
//! #[tokio::main]
//! async fn main() -> perm_authz::Result<()> {
//!     let model = Model::from_text(r#"
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! "#)?;
//!
//!     let adapter = MemoryAdapter::with_rules(vec![
//!         ("p", vec!["admin", "data1", "read"]),
//!         ("g", vec!["alice", "admin"]),
//!     ]);
//!
//!     let enforcer = Enforcer::new(model, adapter).await?;
//!     assert!(enforcer.enforce(["alice", "data1", "read"])?);
//!     assert!(!enforcer.enforce(["alice", "data1", "write"])?);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod cel;
pub mod config;
pub mod effect;
pub mod enforcer;
pub mod error;
pub mod model;
pub mod roles;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use adapter::{Adapter, FileAdapter, Filter, MemoryAdapter};
pub use cel::{CelError, FunctionMap};
pub use config::EnforcerConfig;
pub use effect::{DefaultEffector, Effect, EffectKind, Effector};
pub use enforcer::{Enforcer, EnforcerCacheStats};
pub use error::{AuthzError, Result};
pub use model::{Assertion, Model};
pub use roles::{DefaultRoleManager, MatchingFn, RoleManager};
pub use types::Value;
pub use watcher::{BroadcastWatcher, PolicyChange, Watcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
