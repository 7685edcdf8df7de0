//! The policy decision engine.
//!
//! Resolution is explicit-deny-overrides-allow:
//! 1. Candidates are the active policies for the (business code, action,
//!    resource type) triple, ordered by priority descending (ties broken by
//!    lowest id, for determinism).
//! 2. A candidate matches when its condition tree and optional scope filter
//!    both evaluate true against the merged context.
//! 3. Any matching deny decides DENY; otherwise any matching allow decides
//!    ALLOW; otherwise default deny (fail-closed).
//!
//! Every call is independently reproducible from the policy set and the
//! context; the engine holds no mutable state and performs no writes.

use std::sync::Arc;

use atrium_core::{condition, Subject};
use serde_json::Value as JsonValue;

use crate::context::DecisionContext;
use crate::store::PolicyStore;
use crate::types::{AccessPolicy, DecisionSource, PolicyDecision, PolicyEffect};

/// Resolve a decision from a candidate policy set and a merged context.
///
/// This is the pure core of the engine: no I/O, safe under unbounded
/// parallelism. Inactive candidates are skipped; the slice does not need
/// to be pre-sorted.
#[must_use]
pub fn resolve(policies: &[AccessPolicy], context: &JsonValue) -> PolicyDecision {
    let mut candidates: Vec<&AccessPolicy> = policies.iter().filter(|p| p.is_active).collect();
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

    let mut matched_allow: Option<&AccessPolicy> = None;
    let mut matched_deny: Option<&AccessPolicy> = None;

    for policy in candidates {
        if !policy_matches(policy, context) {
            continue;
        }
        match policy.effect {
            PolicyEffect::Deny => {
                if matched_deny.is_none() {
                    matched_deny = Some(policy);
                }
            }
            PolicyEffect::Allow => {
                if matched_allow.is_none() {
                    matched_allow = Some(policy);
                }
            }
        }
    }

    // Explicit deny overrides allow; priority orders evaluation only.
    if let Some(deny) = matched_deny {
        return PolicyDecision {
            effect: PolicyEffect::Deny,
            source: DecisionSource::Policy,
            policy_id: Some(deny.id),
            reason: format!("denied by policy '{}'", deny.name),
        };
    }
    if let Some(allow) = matched_allow {
        return PolicyDecision {
            effect: PolicyEffect::Allow,
            source: DecisionSource::Policy,
            policy_id: Some(allow.id),
            reason: format!("allowed by policy '{}'", allow.name),
        };
    }

    PolicyDecision::default_deny("no matching policy")
}

fn policy_matches(policy: &AccessPolicy, context: &JsonValue) -> bool {
    let conditions_match = policy
        .conditions
        .as_ref()
        .is_none_or(|tree| condition::evaluate(tree, context));
    let scope_matches = policy
        .scope
        .as_ref()
        .is_none_or(|tree| condition::evaluate(tree, context));

    conditions_match && scope_matches
}

/// The store-backed decision point.
///
/// Loads candidates for the request triple and resolves them with
/// [`resolve`]. Storage failures resolve to default deny rather than an
/// error: callers always receive a decision.
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
}

impl PolicyEngine {
    /// Create an engine over a policy store.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Decide whether `subject` may perform `action` on `resource_type`
    /// within `business_code`.
    pub async fn decide(
        &self,
        subject: &Subject,
        action: &str,
        resource_type: &str,
        business_code: &str,
        context: &DecisionContext,
    ) -> PolicyDecision {
        let policies = match self
            .store
            .find_candidates(business_code, action, resource_type)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                // Fail-closed: deny on error
                tracing::error!(
                    target: "atrium_policy",
                    error = %e,
                    business_code,
                    action,
                    resource_type,
                    "failed to load candidate policies"
                );
                return PolicyDecision::default_deny("internal error: failed to load policies");
            }
        };

        let merged = context.merged(subject);
        let decision = resolve(&policies, &merged);

        tracing::debug!(
            target: "atrium_policy",
            subject_id = %subject.user_id,
            business_code,
            action,
            resource_type,
            effect = %decision.effect,
            policy_id = ?decision.policy_id,
            "policy decision"
        );

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPolicyStore;
    use atrium_core::{ConditionNode, RuleOperator};
    use serde_json::json;
    use uuid::Uuid;

    fn policy(name: &str, effect: PolicyEffect, priority: i32) -> AccessPolicy {
        AccessPolicy {
            id: Uuid::new_v4(),
            name: name.to_string(),
            business_code: "estimate".to_string(),
            action: "update".to_string(),
            resource_type: "estimate".to_string(),
            conditions: None,
            scope: None,
            effect,
            priority,
            is_active: true,
            is_system: false,
        }
    }

    #[test]
    fn test_deny_overrides_allow_regardless_of_priority() {
        let allow = policy("allow-high", PolicyEffect::Allow, 10);
        let deny = policy("deny-low", PolicyEffect::Deny, 5);

        let decision = resolve(&[allow, deny.clone()], &json!({}));

        assert_eq!(decision.effect, PolicyEffect::Deny);
        assert_eq!(decision.policy_id, Some(deny.id));
    }

    #[test]
    fn test_single_allow_decides_allow() {
        let allow = policy("allow", PolicyEffect::Allow, 1);
        let decision = resolve(&[allow.clone()], &json!({}));

        assert_eq!(decision.effect, PolicyEffect::Allow);
        assert_eq!(decision.source, DecisionSource::Policy);
        assert_eq!(decision.policy_id, Some(allow.id));
    }

    #[test]
    fn test_no_match_is_default_deny() {
        let decision = resolve(&[], &json!({}));

        assert_eq!(decision.effect, PolicyEffect::Deny);
        assert_eq!(decision.source, DecisionSource::DefaultDeny);
        assert!(decision.policy_id.is_none());
    }

    #[test]
    fn test_non_matching_conditions_discard_policy() {
        let mut allow = policy("allow-drafts", PolicyEffect::Allow, 1);
        allow.conditions = Some(ConditionNode::rule(
            "resource.status",
            RuleOperator::Eq,
            json!("draft"),
        ));

        let matching = resolve(
            std::slice::from_ref(&allow),
            &json!({"resource.status": "draft"}),
        );
        assert_eq!(matching.effect, PolicyEffect::Allow);

        let non_matching = resolve(
            std::slice::from_ref(&allow),
            &json!({"resource.status": "final"}),
        );
        assert_eq!(non_matching.effect, PolicyEffect::Deny);
        assert_eq!(non_matching.source, DecisionSource::DefaultDeny);
    }

    #[test]
    fn test_scope_filter_is_anded() {
        let mut allow = policy("allow-own-department", PolicyEffect::Allow, 1);
        allow.conditions = Some(ConditionNode::rule(
            "resource.status",
            RuleOperator::Eq,
            json!("draft"),
        ));
        allow.scope = Some(ConditionNode::rule(
            "resource.department",
            RuleOperator::Eq,
            json!("sales"),
        ));

        let in_scope = resolve(
            std::slice::from_ref(&allow),
            &json!({"resource.status": "draft", "resource.department": "sales"}),
        );
        assert_eq!(in_scope.effect, PolicyEffect::Allow);

        let out_of_scope = resolve(
            std::slice::from_ref(&allow),
            &json!({"resource.status": "draft", "resource.department": "hr"}),
        );
        assert_eq!(out_of_scope.source, DecisionSource::DefaultDeny);
    }

    #[test]
    fn test_inactive_policy_is_not_a_candidate() {
        let mut allow = policy("inactive-allow", PolicyEffect::Allow, 1);
        allow.is_active = false;

        let decision = resolve(&[allow], &json!({}));
        assert_eq!(decision.source, DecisionSource::DefaultDeny);
    }

    #[test]
    fn test_highest_priority_allow_reported() {
        let low = policy("allow-low", PolicyEffect::Allow, 1);
        let high = policy("allow-high", PolicyEffect::Allow, 100);

        let decision = resolve(&[low, high.clone()], &json!({}));
        assert_eq!(decision.policy_id, Some(high.id));
    }

    #[test]
    fn test_priority_tie_broken_by_lowest_id() {
        let mut a = policy("allow-a", PolicyEffect::Allow, 10);
        let mut b = policy("allow-b", PolicyEffect::Allow, 10);
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);

        let decision = resolve(&[b, a.clone()], &json!({}));
        assert_eq!(decision.policy_id, Some(a.id));
    }

    #[tokio::test]
    async fn test_engine_decides_over_store() {
        let store = Arc::new(InMemoryPolicyStore::new());
        let mut allow = policy("allow-managers", PolicyEffect::Allow, 1);
        allow.conditions = Some(ConditionNode::rule(
            "subject.system_level",
            RuleOperator::Eq,
            json!("manager"),
        ));
        store.insert(allow).await.unwrap();

        let engine = PolicyEngine::new(store);
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let clerk = Subject::new(Uuid::new_v4());

        let ctx = DecisionContext::new();
        let allowed = engine
            .decide(&manager, "update", "estimate", "estimate", &ctx)
            .await;
        assert!(allowed.is_allowed());

        let denied = engine
            .decide(&clerk, "update", "estimate", "estimate", &ctx)
            .await;
        assert!(!denied.is_allowed());
    }

    #[tokio::test]
    async fn test_engine_triple_mismatch_is_default_deny() {
        let store = Arc::new(InMemoryPolicyStore::new());
        store
            .insert(policy("allow-updates", PolicyEffect::Allow, 1))
            .await
            .unwrap();

        let engine = PolicyEngine::new(store);
        let subject = Subject::new(Uuid::new_v4());

        let decision = engine
            .decide(&subject, "delete", "estimate", "estimate", &DecisionContext::new())
            .await;
        assert_eq!(decision.source, DecisionSource::DefaultDeny);
    }
}
