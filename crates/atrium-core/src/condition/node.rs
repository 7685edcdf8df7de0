//! Condition tree AST types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A node in a condition tree: a group of child nodes or a single rule.
///
/// Serialized as a nested JSON document. A group looks like
/// `{"operator": "and", "rules": [...]}`; a rule looks like
/// `{"field": "amount", "operator": "gte", "value": 10000}`. Trees are
/// immutable once attached to a policy, flow, or step and are only ever
/// walked downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    /// AND/OR over child nodes.
    Group(ConditionGroup),
    /// A single field comparison.
    Rule(ConditionRule),
}

/// A boolean combination of child nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// How the children combine.
    pub operator: GroupOperator,
    /// Child nodes. Never empty in a valid tree.
    pub rules: Vec<ConditionNode>,
}

/// Group combination operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    /// All children must match.
    And,
    /// At least one child must match.
    Or,
}

/// A single field comparison against a context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    /// Context key to compare.
    pub field: String,
    /// Comparison operator.
    pub operator: RuleOperator,
    /// Comparison operand. Ignored by [`RuleOperator::Exists`].
    #[serde(default)]
    pub value: JsonValue,
}

/// Rule comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than (numeric).
    Gt,
    /// Greater than or equal (numeric).
    Gte,
    /// Less than (numeric).
    Lt,
    /// Less than or equal (numeric).
    Lte,
    /// Member of a list.
    In,
    /// Not a member of a list.
    Nin,
    /// Field is present and non-null.
    Exists,
    /// Field's string form matches a pattern.
    Regex,
}

impl ConditionNode {
    /// Parse a condition tree from a raw JSON document.
    ///
    /// Run [`crate::condition::validate`] on the document first when it
    /// comes from an authoring surface; this only enforces the serde shape.
    pub fn from_json(doc: &JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(doc.clone())
    }

    /// Create a rule node.
    #[must_use]
    pub fn rule(field: impl Into<String>, operator: RuleOperator, value: JsonValue) -> Self {
        ConditionNode::Rule(ConditionRule {
            field: field.into(),
            operator,
            value,
        })
    }

    /// Create an AND group.
    #[must_use]
    pub fn and(rules: Vec<ConditionNode>) -> Self {
        ConditionNode::Group(ConditionGroup {
            operator: GroupOperator::And,
            rules,
        })
    }

    /// Create an OR group.
    #[must_use]
    pub fn or(rules: Vec<ConditionNode>) -> Self {
        ConditionNode::Group(ConditionGroup {
            operator: GroupOperator::Or,
            rules,
        })
    }

    /// Collect all context fields referenced anywhere in the tree.
    #[must_use]
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        self.collect_fields(&mut fields);
        fields.sort();
        fields.dedup();
        fields
    }

    fn collect_fields(&self, fields: &mut Vec<String>) {
        match self {
            ConditionNode::Rule(rule) => fields.push(rule.field.clone()),
            ConditionNode::Group(group) => {
                for child in &group.rules {
                    child.collect_fields(fields);
                }
            }
        }
    }
}
