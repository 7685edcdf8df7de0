//! Attribute-based access control for the atrium platform.
//!
//! Every business-object handler asks this crate "may this subject perform
//! this action on this resource?" before mutating state. Policies are
//! scoped by business code, action, and resource type, carry a condition
//! tree over the merged decision context, and contribute an ALLOW or DENY
//! effect. Resolution is explicit-deny-overrides-allow with a default-deny
//! fallback: evaluation is fail-closed end to end.
//!
//! # Components
//!
//! - [`types`] - `AccessPolicy`, `PolicyEffect`, and the `PolicyDecision` output
//! - [`context`] - the merged subject / resource / environment attribute document
//! - [`engine`] - the pure precedence resolver and the store-backed [`engine::PolicyEngine`]
//! - [`store`] - the [`store::PolicyStore`] trait plus an in-memory implementation

pub mod context;
pub mod engine;
pub mod error;
pub mod store;
pub mod types;

pub use context::DecisionContext;
pub use engine::{resolve, PolicyEngine};
pub use error::{PolicyError, Result};
pub use store::{InMemoryPolicyStore, PolicyStore};
pub use types::{AccessPolicy, DecisionSource, PolicyDecision, PolicyEffect};
