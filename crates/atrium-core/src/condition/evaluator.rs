//! Condition tree evaluation against a JSON context.
//!
//! Evaluation is pure and never fails on business data: a missing field,
//! a type mismatch, or a malformed pattern makes the rule evaluate to
//! `false` (fail-safe), not to an error. Structural problems are caught
//! at authoring time by the validator and cannot reach this module.

use serde_json::Value as JsonValue;

use super::node::{ConditionGroup, ConditionNode, ConditionRule, GroupOperator, RuleOperator};

/// Evaluate a condition tree against a JSON object context.
///
/// `context` is the document the tree's `field` names index into: the
/// request-data snapshot for flow and step conditions, the merged decision
/// context for policy conditions. A non-object context matches nothing.
///
/// Safe to call concurrently; trees are read-only after construction.
#[must_use]
pub fn evaluate(node: &ConditionNode, context: &JsonValue) -> bool {
    match node {
        ConditionNode::Group(group) => evaluate_group(group, context),
        ConditionNode::Rule(rule) => evaluate_rule(rule, context),
    }
}

fn evaluate_group(group: &ConditionGroup, context: &JsonValue) -> bool {
    match group.operator {
        GroupOperator::And => group.rules.iter().all(|child| evaluate(child, context)),
        GroupOperator::Or => group.rules.iter().any(|child| evaluate(child, context)),
    }
}

fn evaluate_rule(rule: &ConditionRule, context: &JsonValue) -> bool {
    let actual = match context.get(&rule.field) {
        Some(v) => v,
        None => return false, // Missing field = rule not satisfied (fail-safe)
    };

    match rule.operator {
        RuleOperator::Eq => values_equal(actual, &rule.value),
        RuleOperator::Ne => !values_equal(actual, &rule.value),
        RuleOperator::Gt => compare_numeric(actual, &rule.value, |a, b| a > b),
        RuleOperator::Gte => compare_numeric(actual, &rule.value, |a, b| a >= b),
        RuleOperator::Lt => compare_numeric(actual, &rule.value, |a, b| a < b),
        RuleOperator::Lte => compare_numeric(actual, &rule.value, |a, b| a <= b),
        RuleOperator::In => match rule.value.as_array() {
            Some(list) => list.iter().any(|candidate| values_equal(actual, candidate)),
            None => false,
        },
        RuleOperator::Nin => match rule.value.as_array() {
            Some(list) => !list.iter().any(|candidate| values_equal(actual, candidate)),
            None => false,
        },
        RuleOperator::Exists => !actual.is_null(),
        RuleOperator::Regex => matches_pattern(actual, &rule.value),
    }
}

/// Value equality on normalized scalars.
///
/// Numbers (and numeric strings) compare numerically, so `5`, `5.0`, and
/// `"5"` are all equal; everything else falls back to strict JSON equality.
fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (value_to_f64(a), value_to_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Compare two JSON values numerically. Non-numeric operands never match.
fn compare_numeric(a: &JsonValue, b: &JsonValue, cmp: fn(f64, f64) -> bool) -> bool {
    match (value_to_f64(a), value_to_f64(b)) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

/// Attempt to convert a JSON value to f64.
/// Supports: number, integer, or string that parses to a number.
fn value_to_f64(v: &JsonValue) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_i64().map(|i| i as f64))
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Match the field's string form against a pattern.
///
/// Only scalar field values have a string form; an invalid pattern fails
/// the rule rather than erroring (the validator rejects it at authoring
/// time).
fn matches_pattern(actual: &JsonValue, pattern: &JsonValue) -> bool {
    let pattern = match pattern.as_str() {
        Some(p) => p,
        None => return false,
    };
    let regex = match regex::Regex::new(pattern) {
        Ok(r) => r,
        Err(_) => return false,
    };

    match actual {
        JsonValue::String(s) => regex.is_match(s),
        JsonValue::Number(n) => regex.is_match(&n.to_string()),
        JsonValue::Bool(b) => regex.is_match(if *b { "true" } else { "false" }),
        _ => false,
    }
}
