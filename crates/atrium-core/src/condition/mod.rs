//! Recursive boolean condition trees.
//!
//! A condition tree is either a *group* (AND/OR over child nodes) or a
//! *rule* (a single field comparison). Policies, approval flows, and
//! approval steps all attach one of these trees and evaluate it against a
//! JSON context: a policy against the merged decision context, a flow or
//! step against the request's business-data snapshot.
//!
//! Trees arrive as nested JSON documents and are parsed once into
//! [`ConditionNode`] at the boundary; [`validate`] checks the raw document
//! at authoring time and [`evaluate`] walks the typed tree at decision
//! time. The two share one schema: anything `validate` accepts, `evaluate`
//! handles without error.

pub mod evaluator;
pub mod node;
pub mod validator;

pub use evaluator::evaluate;
pub use node::{ConditionGroup, ConditionNode, ConditionRule, GroupOperator, RuleOperator};
pub use validator::{validate, validate_tree, ValidationReport};
