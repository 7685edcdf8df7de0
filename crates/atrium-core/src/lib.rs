//! atrium Core Library
//!
//! Shared types for the atrium business-process platform.
//!
//! # Modules
//!
//! - [`subject`] - The acting subject (user identity plus resolved employment attributes)
//! - [`condition`] - Recursive boolean condition trees: AST, evaluator, and validator
//!
//! The condition tree is the foundational primitive shared by the access
//! policy engine and the approval workflow engine: both select and gate
//! records by evaluating the same AND/OR rule structure against a JSON
//! context.

pub mod condition;
pub mod subject;

// Re-export main types for convenient access
pub use condition::{
    evaluate, validate, validate_tree, ConditionGroup, ConditionNode, ConditionRule, GroupOperator,
    RuleOperator, ValidationReport,
};
pub use subject::Subject;
