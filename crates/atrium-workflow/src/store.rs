//! Workflow storage.
//!
//! The engine reads flows and mutates requests/history through these
//! traits. The in-memory implementations back tests and single-process
//! deployments (`tokio::sync::RwLock` over hash maps); `atrium-db`
//! provides the PostgreSQL adapters. History is append-only in every
//! implementation: there is no update or delete surface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::types::{ApprovalFlow, ApprovalHistory, ApprovalRequest, HistoryAction, NewHistory};

/// Trait for approval flow storage backends.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Load the active flows of a given type.
    async fn active_flows_by_type(&self, flow_type: &str) -> Result<Vec<ApprovalFlow>>;

    /// Fetch a flow by id.
    async fn find_flow(&self, id: Uuid) -> Result<Option<ApprovalFlow>>;
}

/// Trait for approval request storage backends.
///
/// Callers serialize the read-decide-write sequence per request id; a
/// backend only needs each operation to be individually atomic.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new request.
    async fn insert(&self, request: ApprovalRequest) -> Result<()>;

    /// Fetch a request by id.
    async fn get(&self, id: Uuid) -> Result<Option<ApprovalRequest>>;

    /// Replace a request row.
    async fn update(&self, request: ApprovalRequest) -> Result<ApprovalRequest>;

    /// Find the pending request for a business object, if one exists.
    async fn find_pending_for_reference(
        &self,
        request_type: &str,
        request_id: Uuid,
    ) -> Result<Option<ApprovalRequest>>;

    /// Find pending requests whose expiry deadline has passed.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>>;
}

/// Trait for approval history storage backends. Append-only.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an entry; the store assigns id and timestamp.
    async fn append(&self, entry: NewHistory) -> Result<ApprovalHistory>;

    /// All entries for a request, oldest first.
    async fn list_for_request(&self, request_id: Uuid) -> Result<Vec<ApprovalHistory>>;

    /// Count APPROVE entries for a step of a request.
    async fn approvals_for_step(&self, request_id: Uuid, step: i32) -> Result<i64>;

    /// Delegate targets named by DELEGATE entries for a step of a request.
    async fn delegates_for_step(&self, request_id: Uuid, step: i32) -> Result<Vec<Uuid>>;
}

/// In-memory flow store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: Arc<RwLock<HashMap<Uuid, ApprovalFlow>>>,
}

impl InMemoryFlowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a flow after validating its definition.
    pub async fn insert(&self, flow: ApprovalFlow) -> Result<()> {
        flow.validate()?;
        self.flows.write().await.insert(flow.id, flow);
        Ok(())
    }

    /// Replace an existing flow. System flows are immutable.
    pub async fn update(&self, flow: ApprovalFlow) -> Result<()> {
        flow.validate()?;
        let mut flows = self.flows.write().await;
        match flows.get(&flow.id) {
            None => Err(WorkflowError::FlowNotFound(flow.id)),
            Some(existing) if existing.is_system => {
                Err(WorkflowError::SystemFlowImmutable(flow.id))
            }
            Some(_) => {
                flows.insert(flow.id, flow);
                Ok(())
            }
        }
    }

    /// Delete a flow. System flows are immutable.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut flows = self.flows.write().await;
        match flows.get(&id) {
            None => Err(WorkflowError::FlowNotFound(id)),
            Some(existing) if existing.is_system => Err(WorkflowError::SystemFlowImmutable(id)),
            Some(_) => {
                flows.remove(&id);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn active_flows_by_type(&self, flow_type: &str) -> Result<Vec<ApprovalFlow>> {
        let flows = self.flows.read().await;
        Ok(flows
            .values()
            .filter(|f| f.is_active && f.flow_type == flow_type)
            .cloned()
            .collect())
    }

    async fn find_flow(&self, id: Uuid) -> Result<Option<ApprovalFlow>> {
        Ok(self.flows.read().await.get(&id).cloned())
    }
}

/// In-memory request store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<RwLock<HashMap<Uuid, ApprovalRequest>>>,
}

impl InMemoryRequestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: ApprovalRequest) -> Result<()> {
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ApprovalRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn update(&self, request: ApprovalRequest) -> Result<ApprovalRequest> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id) {
            return Err(WorkflowError::RequestNotFound(request.id));
        }
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_pending_for_reference(
        &self,
        request_type: &str,
        request_id: Uuid,
    ) -> Result<Option<ApprovalRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .find(|r| {
                r.request_type == request_type
                    && r.request_id == request_id
                    && !r.status.is_terminal()
            })
            .cloned())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| {
                r.status.is_pending() && r.expires_at.is_some_and(|deadline| deadline <= now)
            })
            .cloned()
            .collect())
    }
}

/// In-memory history store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: Arc<RwLock<Vec<ApprovalHistory>>>,
}

impl InMemoryHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Total number of entries across all requests.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: NewHistory) -> Result<ApprovalHistory> {
        let row = ApprovalHistory {
            id: Uuid::new_v4(),
            approval_request_id: entry.approval_request_id,
            step: entry.step,
            action: entry.action,
            acted_by: entry.acted_by,
            acted_at: Utc::now(),
            comment: entry.comment,
            delegate_to: entry.delegate_to,
        };
        self.entries.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_for_request(&self, request_id: Uuid) -> Result<Vec<ApprovalHistory>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.approval_request_id == request_id)
            .cloned()
            .collect())
    }

    async fn approvals_for_step(&self, request_id: Uuid, step: i32) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                e.approval_request_id == request_id
                    && e.step == step
                    && e.action == HistoryAction::Approve
            })
            .count() as i64)
    }

    async fn delegates_for_step(&self, request_id: Uuid, step: i32) -> Result<Vec<Uuid>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                e.approval_request_id == request_id
                    && e.step == step
                    && e.action == HistoryAction::Delegate
            })
            .filter_map(|e| e.delegate_to)
            .collect())
    }
}
