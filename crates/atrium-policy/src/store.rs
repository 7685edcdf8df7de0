//! Policy storage.
//!
//! The engine reads policies through the [`PolicyStore`] trait; the
//! in-memory implementation backs tests and single-process deployments,
//! and `atrium-db` provides the PostgreSQL adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use atrium_core::condition;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{PolicyError, Result};
use crate::types::AccessPolicy;

/// Trait for policy storage backends.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Load the active candidate policies for a request triple.
    async fn find_candidates(
        &self,
        business_code: &str,
        action: &str,
        resource_type: &str,
    ) -> Result<Vec<AccessPolicy>>;

    /// Fetch a policy by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccessPolicy>>;
}

/// In-memory policy store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    policies: Arc<RwLock<HashMap<Uuid, AccessPolicy>>>,
}

impl InMemoryPolicyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a policy, validating its condition trees.
    pub async fn insert(&self, policy: AccessPolicy) -> Result<()> {
        validate_policy(&policy)?;
        self.policies.write().await.insert(policy.id, policy);
        Ok(())
    }

    /// Replace an existing policy. System policies are immutable.
    pub async fn update(&self, policy: AccessPolicy) -> Result<()> {
        validate_policy(&policy)?;
        let mut policies = self.policies.write().await;
        match policies.get(&policy.id) {
            None => Err(PolicyError::PolicyNotFound(policy.id)),
            Some(existing) if existing.is_system => {
                Err(PolicyError::SystemPolicyImmutable(policy.id))
            }
            Some(_) => {
                policies.insert(policy.id, policy);
                Ok(())
            }
        }
    }

    /// Delete a policy. System policies are immutable.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut policies = self.policies.write().await;
        match policies.get(&id) {
            None => Err(PolicyError::PolicyNotFound(id)),
            Some(existing) if existing.is_system => Err(PolicyError::SystemPolicyImmutable(id)),
            Some(_) => {
                policies.remove(&id);
                Ok(())
            }
        }
    }

    /// Number of stored policies.
    pub async fn count(&self) -> usize {
        self.policies.read().await.len()
    }
}

fn validate_policy(policy: &AccessPolicy) -> Result<()> {
    for tree in [policy.conditions.as_ref(), policy.scope.as_ref()]
        .into_iter()
        .flatten()
    {
        let report = condition::validate_tree(tree);
        if !report.valid {
            return Err(PolicyError::Validation(report.errors.join("; ")));
        }
    }
    Ok(())
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn find_candidates(
        &self,
        business_code: &str,
        action: &str,
        resource_type: &str,
    ) -> Result<Vec<AccessPolicy>> {
        let policies = self.policies.read().await;
        Ok(policies
            .values()
            .filter(|p| {
                p.is_active
                    && p.business_code == business_code
                    && p.action == action
                    && p.resource_type == resource_type
            })
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccessPolicy>> {
        Ok(self.policies.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PolicyEffect;
    use atrium_core::ConditionNode;

    fn policy(business_code: &str, action: &str) -> AccessPolicy {
        AccessPolicy {
            id: Uuid::new_v4(),
            name: format!("{business_code}-{action}"),
            business_code: business_code.to_string(),
            action: action.to_string(),
            resource_type: business_code.to_string(),
            conditions: None,
            scope: None,
            effect: PolicyEffect::Allow,
            priority: 0,
            is_active: true,
            is_system: false,
        }
    }

    #[tokio::test]
    async fn test_find_candidates_filters_triple() {
        let store = InMemoryPolicyStore::new();
        store.insert(policy("estimate", "update")).await.unwrap();
        store.insert(policy("estimate", "delete")).await.unwrap();
        store.insert(policy("partner", "update")).await.unwrap();

        let candidates = store
            .find_candidates("estimate", "update", "estimate")
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].action, "update");
    }

    #[tokio::test]
    async fn test_inactive_policies_excluded() {
        let store = InMemoryPolicyStore::new();
        let mut inactive = policy("estimate", "update");
        inactive.is_active = false;
        store.insert(inactive).await.unwrap();

        let candidates = store
            .find_candidates("estimate", "update", "estimate")
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_tree() {
        let store = InMemoryPolicyStore::new();
        let mut bad = policy("estimate", "update");
        bad.conditions = Some(ConditionNode::and(vec![]));

        let err = store.insert(bad).await.unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_system_policy_immutable() {
        let store = InMemoryPolicyStore::new();
        let mut system = policy("estimate", "update");
        system.is_system = true;
        let id = system.id;
        store.insert(system.clone()).await.unwrap();

        let err = store.update(system).await.unwrap_err();
        assert!(matches!(err, PolicyError::SystemPolicyImmutable(_)));

        let err = store.remove(id).await.unwrap_err();
        assert!(matches!(err, PolicyError::SystemPolicyImmutable(_)));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_update_missing_policy() {
        let store = InMemoryPolicyStore::new();
        let err = store.update(policy("estimate", "update")).await.unwrap_err();
        assert!(matches!(err, PolicyError::PolicyNotFound(_)));
    }
}
