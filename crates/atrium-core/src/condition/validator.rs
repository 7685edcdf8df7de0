//! Structural validation of raw condition documents.
//!
//! Runs at authoring time, before a document is parsed into a
//! [`ConditionNode`](super::node::ConditionNode) and attached to a policy,
//! flow, or step. The schema enforced here is the same one the evaluator
//! walks; a document that passes validation always parses and never
//! surprises the evaluator.

use serde_json::Value as JsonValue;

const GROUP_OPERATORS: &[&str] = &["and", "or"];
const RULE_OPERATORS: &[&str] = &[
    "eq", "ne", "gt", "gte", "lt", "lte", "in", "nin", "exists", "regex",
];

/// Outcome of validating a condition document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the document is structurally valid.
    pub valid: bool,
    /// Path-prefixed error messages (e.g. `rules[2].rules[0]: missing 'field'`).
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }
}

/// Validate a raw condition document.
pub fn validate(doc: &JsonValue) -> ValidationReport {
    let mut errors = Vec::new();
    validate_node(doc, "", &mut errors);

    if errors.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport {
            valid: false,
            errors,
        }
    }
}

fn validate_node(doc: &JsonValue, path: &str, errors: &mut Vec<String>) {
    let obj = match doc.as_object() {
        Some(obj) => obj,
        None => {
            push_error(errors, path, "condition node must be an object");
            return;
        }
    };

    // A node with a "rules" key (or a group operator) is a group; anything
    // else is treated as a rule.
    let operator = obj.get("operator").and_then(|v| v.as_str());
    let is_group = obj.contains_key("rules") || operator.is_some_and(|op| GROUP_OPERATORS.contains(&op));

    if is_group {
        validate_group(obj, operator, path, errors);
    } else {
        validate_rule(obj, operator, path, errors);
    }
}

fn validate_group(
    obj: &serde_json::Map<String, JsonValue>,
    operator: Option<&str>,
    path: &str,
    errors: &mut Vec<String>,
) {
    match operator {
        Some(op) if GROUP_OPERATORS.contains(&op) => {}
        Some(op) => push_error(
            errors,
            path,
            &format!("unknown group operator '{op}' (expected 'and' or 'or')"),
        ),
        None => push_error(errors, path, "group is missing 'operator'"),
    }

    match obj.get("rules").and_then(|v| v.as_array()) {
        Some(rules) if !rules.is_empty() => {
            for (i, child) in rules.iter().enumerate() {
                let child_path = if path.is_empty() {
                    format!("rules[{i}]")
                } else {
                    format!("{path}.rules[{i}]")
                };
                validate_node(child, &child_path, errors);
            }
        }
        _ => push_error(errors, path, "'rules' must be a non-empty array"),
    }
}

fn validate_rule(
    obj: &serde_json::Map<String, JsonValue>,
    operator: Option<&str>,
    path: &str,
    errors: &mut Vec<String>,
) {
    match obj.get("field").and_then(|v| v.as_str()) {
        Some(field) if !field.is_empty() => {}
        _ => push_error(errors, path, "rule is missing 'field'"),
    }

    let operator = match operator {
        Some(op) if RULE_OPERATORS.contains(&op) => op,
        Some(op) => {
            push_error(errors, path, &format!("unknown rule operator '{op}'"));
            return;
        }
        None => {
            push_error(errors, path, "rule is missing 'operator'");
            return;
        }
    };

    let value = obj.get("value").unwrap_or(&JsonValue::Null);
    match operator {
        "in" | "nin" => {
            if !value.is_array() {
                push_error(errors, path, &format!("'{operator}' requires an array value"));
            }
        }
        "regex" => match value.as_str() {
            Some(pattern) => {
                if regex::Regex::new(pattern).is_err() {
                    push_error(errors, path, &format!("invalid regex pattern '{pattern}'"));
                }
            }
            None => push_error(errors, path, "'regex' requires a string pattern value"),
        },
        _ => {}
    }
}

/// Validate an already-parsed condition tree.
///
/// Serde enforces operator names and value shapes at parse time, but a
/// tree built programmatically can still carry an empty group, a
/// non-array `in`/`nin` operand, or an uncompilable pattern. Stores call
/// this before accepting a tree.
pub fn validate_tree(node: &super::node::ConditionNode) -> ValidationReport {
    let mut errors = Vec::new();
    validate_tree_node(node, "", &mut errors);

    if errors.is_empty() {
        ValidationReport::ok()
    } else {
        ValidationReport {
            valid: false,
            errors,
        }
    }
}

fn validate_tree_node(node: &super::node::ConditionNode, path: &str, errors: &mut Vec<String>) {
    use super::node::{ConditionNode, RuleOperator};

    match node {
        ConditionNode::Group(group) => {
            if group.rules.is_empty() {
                push_error(errors, path, "'rules' must be a non-empty array");
                return;
            }
            for (i, child) in group.rules.iter().enumerate() {
                let child_path = if path.is_empty() {
                    format!("rules[{i}]")
                } else {
                    format!("{path}.rules[{i}]")
                };
                validate_tree_node(child, &child_path, errors);
            }
        }
        ConditionNode::Rule(rule) => {
            if rule.field.is_empty() {
                push_error(errors, path, "rule is missing 'field'");
            }
            match rule.operator {
                RuleOperator::In | RuleOperator::Nin => {
                    if !rule.value.is_array() {
                        push_error(errors, path, "'in'/'nin' requires an array value");
                    }
                }
                RuleOperator::Regex => match rule.value.as_str() {
                    Some(pattern) => {
                        if regex::Regex::new(pattern).is_err() {
                            push_error(
                                errors,
                                path,
                                &format!("invalid regex pattern '{pattern}'"),
                            );
                        }
                    }
                    None => push_error(errors, path, "'regex' requires a string pattern value"),
                },
                _ => {}
            }
        }
    }
}

fn push_error(errors: &mut Vec<String>, path: &str, message: &str) {
    if path.is_empty() {
        errors.push(message.to_string());
    } else {
        errors.push(format!("{path}: {message}"));
    }
}
