//! PostgreSQL adapters for the engine store traits.
//!
//! Each adapter wraps a `PgPool` and bridges rows to the typed domain
//! structures. The policy and flow adapters are also the authoring
//! surface: creation validates condition documents before they reach the
//! table, and updates/deletes refuse system records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use atrium_core::condition;
use atrium_policy::{AccessPolicy, PolicyError, PolicyStore};
use atrium_workflow::{
    ApprovalFlow, ApprovalHistory, ApprovalRequest, FlowStore, HistoryStore, NewHistory,
    RequestStore, WorkflowError,
};

use crate::error::DbError;
use crate::models::{
    AccessPolicyRow, ApprovalFlowRow, ApprovalHistoryRow, ApprovalRequestRow, CreateAccessPolicy,
    CreateApprovalFlow,
};

/// How many overdue requests one sweep batch picks up.
const SWEEP_BATCH: i64 = 100;

/// Policy store over PostgreSQL.
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    /// Create a store over a pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a policy, validating its condition documents first.
    pub async fn create_policy(&self, input: CreateAccessPolicy) -> Result<AccessPolicy, DbError> {
        validate_document(input.conditions.as_ref())?;
        validate_document(input.scope.as_ref())?;

        let row = AccessPolicyRow::create(&self.pool, input).await?;
        row.to_policy()
    }

    /// Activate or deactivate a policy. System policies are immutable.
    pub async fn set_policy_active(&self, id: Uuid, is_active: bool) -> Result<AccessPolicy, DbError> {
        self.guard_system_policy(id).await?;
        let row = AccessPolicyRow::set_active(&self.pool, id, is_active)
            .await?
            .ok_or(DbError::NotFound(id))?;
        row.to_policy()
    }

    /// Delete a policy. System policies are immutable.
    pub async fn delete_policy(&self, id: Uuid) -> Result<(), DbError> {
        self.guard_system_policy(id).await?;
        if !AccessPolicyRow::delete(&self.pool, id).await? {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    async fn guard_system_policy(&self, id: Uuid) -> Result<(), DbError> {
        let existing = AccessPolicyRow::find_by_id(&self.pool, id)
            .await?
            .ok_or(DbError::NotFound(id))?;
        if existing.is_system {
            return Err(DbError::SystemRecordImmutable(id));
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn find_candidates(
        &self,
        business_code: &str,
        action: &str,
        resource_type: &str,
    ) -> Result<Vec<AccessPolicy>, PolicyError> {
        let rows =
            AccessPolicyRow::find_candidates(&self.pool, business_code, action, resource_type)
                .await
                .map_err(|e| PolicyError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| row.to_policy().map_err(|e| PolicyError::Storage(e.to_string())))
            .collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AccessPolicy>, PolicyError> {
        let row = AccessPolicyRow::find_by_id(&self.pool, id)
            .await
            .map_err(|e| PolicyError::Storage(e.to_string()))?;
        row.map(|r| r.to_policy().map_err(|e| PolicyError::Storage(e.to_string())))
            .transpose()
    }
}

/// Flow store over PostgreSQL.
pub struct PgFlowStore {
    pool: PgPool,
}

impl PgFlowStore {
    /// Create a store over a pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a flow, validating the full definition first.
    pub async fn create_flow(&self, input: CreateApprovalFlow) -> Result<ApprovalFlow, DbError> {
        validate_document(input.conditions.as_ref())?;

        let row = ApprovalFlowRow::create(&self.pool, input).await?;
        let flow = row.to_flow()?;
        flow.validate()
            .map_err(|e| DbError::Validation(e.to_string()))?;
        Ok(flow)
    }

    /// Activate or deactivate a flow. System flows are immutable.
    pub async fn set_flow_active(&self, id: Uuid, is_active: bool) -> Result<ApprovalFlow, DbError> {
        self.guard_system_flow(id).await?;
        let row = ApprovalFlowRow::set_active(&self.pool, id, is_active)
            .await?
            .ok_or(DbError::NotFound(id))?;
        row.to_flow()
    }

    /// Delete a flow. System flows are immutable.
    pub async fn delete_flow(&self, id: Uuid) -> Result<(), DbError> {
        self.guard_system_flow(id).await?;
        if !ApprovalFlowRow::delete(&self.pool, id).await? {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    async fn guard_system_flow(&self, id: Uuid) -> Result<(), DbError> {
        let existing = ApprovalFlowRow::find_by_id(&self.pool, id)
            .await?
            .ok_or(DbError::NotFound(id))?;
        if existing.is_system {
            return Err(DbError::SystemRecordImmutable(id));
        }
        Ok(())
    }
}

#[async_trait]
impl FlowStore for PgFlowStore {
    async fn active_flows_by_type(&self, flow_type: &str) -> Result<Vec<ApprovalFlow>, WorkflowError> {
        let rows = ApprovalFlowRow::find_active_by_type(&self.pool, flow_type)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| row.to_flow().map_err(|e| WorkflowError::Storage(e.to_string())))
            .collect()
    }

    async fn find_flow(&self, id: Uuid) -> Result<Option<ApprovalFlow>, WorkflowError> {
        let row = ApprovalFlowRow::find_by_id(&self.pool, id)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        row.map(|r| r.to_flow().map_err(|e| WorkflowError::Storage(e.to_string())))
            .transpose()
    }
}

/// Request store over PostgreSQL.
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    /// Create a store over a pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: ApprovalRequest) -> Result<(), WorkflowError> {
        let row = ApprovalRequestRow::from_request(&request);
        ApprovalRequestRow::insert(&self.pool, &row)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ApprovalRequest>, WorkflowError> {
        let row = ApprovalRequestRow::find_by_id(&self.pool, id)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        row.map(|r| r.to_request().map_err(|e| WorkflowError::Storage(e.to_string())))
            .transpose()
    }

    async fn update(&self, request: ApprovalRequest) -> Result<ApprovalRequest, WorkflowError> {
        let row = ApprovalRequestRow::from_request(&request);
        let updated = ApprovalRequestRow::update(&self.pool, &row)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?
            .ok_or(WorkflowError::RequestNotFound(request.id))?;
        updated
            .to_request()
            .map_err(|e| WorkflowError::Storage(e.to_string()))
    }

    async fn find_pending_for_reference(
        &self,
        request_type: &str,
        request_id: Uuid,
    ) -> Result<Option<ApprovalRequest>, WorkflowError> {
        let row = ApprovalRequestRow::find_pending_for_reference(&self.pool, request_type, request_id)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        row.map(|r| r.to_request().map_err(|e| WorkflowError::Storage(e.to_string())))
            .transpose()
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>, WorkflowError> {
        let rows = ApprovalRequestRow::find_expired(&self.pool, now, SWEEP_BATCH)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| row.to_request().map_err(|e| WorkflowError::Storage(e.to_string())))
            .collect()
    }
}

/// History store over PostgreSQL. Append-only.
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    /// Create a store over a pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, entry: NewHistory) -> Result<ApprovalHistory, WorkflowError> {
        let row = ApprovalHistoryRow::create(&self.pool, &entry)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;
        row.to_history()
            .map_err(|e| WorkflowError::Storage(e.to_string()))
    }

    async fn list_for_request(&self, request_id: Uuid) -> Result<Vec<ApprovalHistory>, WorkflowError> {
        let rows = ApprovalHistoryRow::find_by_request(&self.pool, request_id)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| row.to_history().map_err(|e| WorkflowError::Storage(e.to_string())))
            .collect()
    }

    async fn approvals_for_step(&self, request_id: Uuid, step: i32) -> Result<i64, WorkflowError> {
        ApprovalHistoryRow::count_approvals_for_step(&self.pool, request_id, step)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))
    }

    async fn delegates_for_step(
        &self,
        request_id: Uuid,
        step: i32,
    ) -> Result<Vec<Uuid>, WorkflowError> {
        ApprovalHistoryRow::find_delegates_for_step(&self.pool, request_id, step)
            .await
            .map_err(|e| WorkflowError::Storage(e.to_string()))
    }
}

/// Validate a raw condition document at the authoring surface.
fn validate_document(doc: Option<&JsonValue>) -> Result<(), DbError> {
    let Some(doc) = doc else {
        return Ok(());
    };
    if doc.is_null() {
        return Ok(());
    }

    let report = condition::validate(doc);
    if !report.valid {
        return Err(DbError::Validation(report.errors.join("; ")));
    }
    Ok(())
}
