//! Approval flow selection.
//!
//! Picks the flow a new request should travel through: active flows of
//! the matching type are filtered by their selection conditions against
//! the request data, and the smallest-priority survivor wins. Finding no
//! flow is a normal outcome, not a defect.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use atrium_core::condition;

use crate::error::Result;
use crate::store::FlowStore;
use crate::types::ApprovalFlow;

/// Pick the applicable flow from a candidate list.
///
/// Candidates whose condition tree is absent match unconditionally.
/// Smallest `priority` wins (lower number = higher precedence); ties are
/// broken by lowest id for determinism.
#[must_use]
pub fn select_from(mut candidates: Vec<ApprovalFlow>, request_data: &JsonValue) -> Option<ApprovalFlow> {
    candidates.retain(|flow| flow.is_active);
    candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

    candidates.into_iter().find(|flow| {
        flow.conditions
            .as_ref()
            .is_none_or(|tree| condition::evaluate(tree, request_data))
    })
}

/// Store-backed flow selector.
pub struct ApprovalFlowSelector {
    flows: Arc<dyn FlowStore>,
}

impl ApprovalFlowSelector {
    /// Create a selector over a flow store.
    pub fn new(flows: Arc<dyn FlowStore>) -> Self {
        Self { flows }
    }

    /// Select the applicable flow for a new request, or `None` when no
    /// flow matches.
    pub async fn select(
        &self,
        flow_type: &str,
        request_data: &JsonValue,
    ) -> Result<Option<ApprovalFlow>> {
        let candidates = self.flows.active_flows_by_type(flow_type).await?;
        Ok(select_from(candidates, request_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFlowStore;
    use crate::types::{ApprovalStep, SubjectSpec};
    use atrium_core::{ConditionNode, RuleOperator};
    use serde_json::json;
    use uuid::Uuid;

    fn flow(name: &str, priority: i32, conditions: Option<ConditionNode>) -> ApprovalFlow {
        ApprovalFlow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            flow_type: "estimate".to_string(),
            conditions,
            requesters: vec![],
            approval_steps: vec![ApprovalStep {
                step: 1,
                name: "Manager sign-off".to_string(),
                approvers: vec![SubjectSpec::system_level("manager")],
                condition: None,
            }],
            priority,
            is_active: true,
            is_system: false,
        }
    }

    #[test]
    fn test_smallest_priority_wins() {
        let low = flow("low-precedence", 5, None);
        let high = flow("high-precedence", 1, None);

        let selected = select_from(vec![low, high.clone()], &json!({})).unwrap();
        assert_eq!(selected.id, high.id);
    }

    #[test]
    fn test_condition_filters_candidates() {
        let gated = flow(
            "high-value",
            1,
            Some(ConditionNode::rule(
                "amount",
                RuleOperator::Gte,
                json!(10_000),
            )),
        );
        let fallback = flow("default", 5, None);

        let small = select_from(
            vec![gated.clone(), fallback.clone()],
            &json!({"amount": 500}),
        )
        .unwrap();
        assert_eq!(small.id, fallback.id);

        let large = select_from(vec![gated.clone(), fallback], &json!({"amount": 50_000})).unwrap();
        assert_eq!(large.id, gated.id);
    }

    #[test]
    fn test_no_match_is_none() {
        let gated = flow(
            "high-value",
            1,
            Some(ConditionNode::rule(
                "amount",
                RuleOperator::Gte,
                json!(10_000),
            )),
        );

        assert!(select_from(vec![gated], &json!({"amount": 1})).is_none());
        assert!(select_from(vec![], &json!({})).is_none());
    }

    #[test]
    fn test_inactive_flows_skipped() {
        let mut inactive = flow("inactive", 1, None);
        inactive.is_active = false;
        let active = flow("active", 9, None);

        let selected = select_from(vec![inactive, active.clone()], &json!({})).unwrap();
        assert_eq!(selected.id, active.id);
    }

    #[test]
    fn test_priority_tie_broken_by_lowest_id() {
        let mut a = flow("a", 3, None);
        let mut b = flow("b", 3, None);
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);

        let selected = select_from(vec![b, a.clone()], &json!({})).unwrap();
        assert_eq!(selected.id, a.id);
    }

    #[tokio::test]
    async fn test_store_backed_selection() {
        let store = Arc::new(InMemoryFlowStore::new());
        store.insert(flow("default", 1, None)).await.unwrap();

        let selector = ApprovalFlowSelector::new(store);

        let selected = selector.select("estimate", &json!({})).await.unwrap();
        assert!(selected.is_some());

        let other_type = selector.select("purchase_order", &json!({})).await.unwrap();
        assert!(other_type.is_none());
    }
}
