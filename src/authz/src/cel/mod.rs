//! CEL (Common Expression Language) matcher evaluation
//!
//! Matchers from the model are rewritten to flattened variable names
//! ([`matcher`]), compiled once and cached ([`engine`]), and evaluated against
//! request/policy [`Bindings`] with a [`FunctionMap`] of built-in and custom
//! predicates plus one reachability function per role relation.

pub mod engine;
pub mod functions;
pub mod context;
pub mod error;
pub mod convert;
pub mod matcher;

pub use engine::{Engine, RelationFn, RelationMap};
pub use context::Bindings;
pub use convert::MatcherOutcome;
pub use error::{CelError, Result};
pub use functions::{FunctionMap, MatcherFn, PatternCache};
