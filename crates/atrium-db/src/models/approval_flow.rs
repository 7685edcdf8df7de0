//! Approval flow model.
//!
//! A flow row owns its step list and requester specs as JSONB documents;
//! [`ApprovalFlowRow::to_flow`] parses the whole definition into the typed
//! domain flow in one step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use atrium_workflow::{ApprovalFlow, ApprovalStep, SubjectSpec};

use crate::error::DbError;
use crate::models::access_policy::parse_tree;

/// A stored approval flow.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApprovalFlowRow {
    /// Unique identifier for the flow.
    pub id: Uuid,

    /// Human-readable name.
    pub name: String,

    /// Business domain the flow serves.
    pub flow_type: String,

    /// Selection condition document (JSONB). NULL matches unconditionally.
    pub conditions: Option<JsonValue>,

    /// Requester spec list (JSONB array). Empty means anyone.
    pub requesters: JsonValue,

    /// Step list (JSONB array).
    pub approval_steps: JsonValue,

    /// Selection precedence among matching flows: smaller wins.
    pub priority: i32,

    /// Inactive flows are never selected.
    pub is_active: bool,

    /// System flows cannot be modified or deleted.
    pub is_system: bool,

    /// When the flow was created.
    pub created_at: DateTime<Utc>,

    /// When the flow was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApprovalFlow {
    pub name: String,
    pub flow_type: String,
    pub conditions: Option<JsonValue>,
    pub requesters: JsonValue,
    pub approval_steps: JsonValue,
    pub priority: i32,
    pub is_active: bool,
    pub is_system: bool,
}

impl ApprovalFlowRow {
    /// Find a flow by ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_flows
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find the active flows of a type, ordered by selection precedence.
    pub async fn find_active_by_type(
        pool: &sqlx::PgPool,
        flow_type: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_flows
            WHERE flow_type = $1 AND is_active = true
            ORDER BY priority ASC, id ASC
            ",
        )
        .bind(flow_type)
        .fetch_all(pool)
        .await
    }

    /// Create a new flow.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: CreateApprovalFlow,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO approval_flows (
                name, flow_type, conditions, requesters, approval_steps,
                priority, is_active, is_system
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(&input.name)
        .bind(&input.flow_type)
        .bind(&input.conditions)
        .bind(&input.requesters)
        .bind(&input.approval_steps)
        .bind(input.priority)
        .bind(input.is_active)
        .bind(input.is_system)
        .fetch_one(pool)
        .await
    }

    /// Activate or deactivate a flow.
    pub async fn set_active(
        pool: &sqlx::PgPool,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE approval_flows
            SET is_active = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(pool)
        .await
    }

    /// Delete a flow.
    pub async fn delete(pool: &sqlx::PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM approval_flows
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Parse the row into the typed domain flow.
    pub fn to_flow(&self) -> Result<ApprovalFlow, DbError> {
        let requesters: Vec<SubjectSpec> =
            serde_json::from_value(self.requesters.clone()).map_err(|e| DbError::Corrupted {
                table: "approval_flows",
                message: format!("unparseable requester specs: {e}"),
            })?;
        let approval_steps: Vec<ApprovalStep> = serde_json::from_value(
            self.approval_steps.clone(),
        )
        .map_err(|e| DbError::Corrupted {
            table: "approval_flows",
            message: format!("unparseable step list: {e}"),
        })?;

        Ok(ApprovalFlow {
            id: self.id,
            name: self.name.clone(),
            flow_type: self.flow_type.clone(),
            conditions: parse_tree(self.conditions.as_ref(), "approval_flows")?,
            requesters,
            approval_steps,
            priority: self.priority,
            is_active: self.is_active,
            is_system: self.is_system,
        })
    }
}
