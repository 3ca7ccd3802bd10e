//! # ace
//!
//! An access control engine deciding whether a widget may invoke a named
//! platform capability, reconciling a XACML-style policy tree's verdict with
//! the user's own preferences.
//!
//! ## Overview
//!
//! A request names a subject, a resource, and a function. The
//! [`pip::PolicyInformationPoint`] resolves the attributes the current
//! [`tree::PolicyTree`] references, the tree is evaluated down to an
//! [`effect::Effect`], and [`preference::reconcile`] folds in the caller's
//! global and per-feature preferences to produce the final
//! [`effect::PolicyResult`].
//!
//! ## Modules
//!
//! - [`config`] - engine configuration
//! - [`attribute`] / [`attribute_set`] - resolved values and the three-valued match algebra
//! - [`condition`] - target and condition boolean algebra
//! - [`effect`] - the internal `Effect` lattice and external `PolicyResult`
//! - [`combiner`] - rule/policy combining algorithms
//! - [`tree`] - the arena-backed policy tree
//! - [`pip`] - attribute resolution contract
//! - [`preference`] - user preferences and reconciliation
//! - [`request`] - the external request shape
//! - [`cache`] - the content-addressed verdict cache
//! - [`loader`] - policy document parsing and atomic hot-reload
//! - [`reload`] - debounced, retried reload orchestration
//! - [`engine`] - the evaluator tying every component together
//! - [`storage`] - settings-store trait for user preferences
//! - [`error`] - the crate's error taxonomy

pub mod attribute;
pub mod attribute_set;
pub mod cache;
pub mod combiner;
pub mod condition;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod loader;
pub mod pip;
pub mod preference;
pub mod reload;
pub mod request;
pub mod storage;
pub mod tree;

pub use config::{AceConfig, ConfigError};
pub use effect::{Effect, PolicyResult, TriState};
pub use engine::{EvaluationResult, PolicyEvaluator};
pub use error::{AceError, ErrorCategory, LoadError};
pub use preference::{GlobalPreference, UserPreference, reconcile};
pub use request::Request;
pub use tree::PolicyTree;

/// Type alias for engine results.
pub type AceResult<T> = Result<T, AceError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ace::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AceResult;
    pub use crate::attribute::{Attribute, AttributeValue, MatchOperator, UriAccessor};
    pub use crate::attribute_set::AttributeSet;
    pub use crate::cache::{VerdictCache, VerdictStore};
    pub use crate::combiner::CombiningAlgorithm;
    pub use crate::condition::{Condition, Predicate, Target};
    pub use crate::config::{AceConfig, ConfigError};
    pub use crate::effect::{Effect, PolicyResult, TriState};
    pub use crate::engine::{EvaluationResult, PolicyEvaluator};
    pub use crate::error::{AceError, ErrorCategory, LoadError};
    pub use crate::loader::PolicyLoader;
    pub use crate::pip::PolicyInformationPoint;
    pub use crate::preference::{GlobalPreference, UserPreference, reconcile};
    pub use crate::reload::{PolicyChange, PolicyChangeNotifier, PolicyReloadService};
    pub use crate::request::Request;
    pub use crate::storage::{PreferenceKey, SettingsStore};
    pub use crate::tree::PolicyTree;
}
