//! Policy and decision types.

use atrium_core::ConditionNode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The outcome a policy contributes: allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
    /// Grants the action if no deny policy also matches.
    Allow,
    /// Forbids the action regardless of matching allow policies.
    Deny,
}

impl PolicyEffect {
    /// The canonical string form used in storage and serialization.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }

    /// Parse the canonical string form.
    #[must_use]
    pub fn from_effect_str(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

impl std::fmt::Display for PolicyEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute-based access policy.
///
/// Selected by the (`business_code`, `action`, `resource_type`) triple and
/// matched by evaluating `conditions` (and the optional `scope` filter)
/// against the merged decision context. Condition trees are parsed once at
/// the persistence boundary and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Unique identifier for the policy.
    pub id: Uuid,

    /// Human-readable name.
    pub name: String,

    /// Business domain this policy is scoped to (e.g. "estimate").
    pub business_code: String,

    /// Action the policy covers (e.g. "update", "submit").
    pub action: String,

    /// Resource type the policy covers.
    pub resource_type: String,

    /// Condition tree over the merged decision context. Absent matches
    /// unconditionally.
    pub conditions: Option<ConditionNode>,

    /// Optional extra filter ANDed with `conditions`.
    pub scope: Option<ConditionNode>,

    /// The effect this policy contributes when it matches.
    pub effect: PolicyEffect,

    /// Ordering signal among candidates (higher evaluates first). Never an
    /// absolute override: a matching deny wins at any priority.
    pub priority: i32,

    /// Inactive policies are never candidates.
    pub is_active: bool,

    /// System policies cannot be modified or deleted.
    pub is_system: bool,
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A policy matched and determined the effect.
    Policy,
    /// No policy matched; the engine fell through to default deny.
    DefaultDeny,
}

/// The result of a policy decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// The resolved effect.
    pub effect: PolicyEffect,
    /// Where the effect came from.
    pub source: DecisionSource,
    /// The policy that determined the effect, when one did.
    pub policy_id: Option<Uuid>,
    /// Human-readable explanation for audit logs.
    pub reason: String,
}

impl PolicyDecision {
    /// Whether the decision permits the action.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self.effect, PolicyEffect::Allow)
    }

    pub(crate) fn default_deny(reason: impl Into<String>) -> Self {
        Self {
            effect: PolicyEffect::Deny,
            source: DecisionSource::DefaultDeny,
            policy_id: None,
            reason: reason.into(),
        }
    }
}
