//! Approval request model.
//!
//! The request row is the only mutable record in the engine. The
//! `FOR UPDATE` accessor gives transaction-scoped callers a row-level
//! lock over the read-decide-write sequence; single-process deployments
//! get the same exclusivity from the state machine's per-request lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use atrium_workflow::{ApprovalRequest, RequestStatus};

use crate::error::DbError;

/// A stored approval request.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApprovalRequestRow {
    /// Unique identifier for the request.
    pub id: Uuid,

    /// The flow driving this request.
    pub approval_flow_id: Uuid,

    /// Business domain of the referenced object.
    pub request_type: String,

    /// Reference to the business object under approval.
    pub request_id: Uuid,

    /// The currently active step number.
    pub current_step: i32,

    /// Status as its canonical string form.
    pub status: String,

    /// Secondary status annotation.
    pub sub_status: Option<String>,

    /// Business data snapshot (JSONB).
    pub request_data: JsonValue,

    /// The user who submitted the request.
    pub requested_by: Uuid,

    /// Set when the request reaches approved.
    pub approved_by: Option<Uuid>,
    /// Set when the request reaches approved.
    pub approved_at: Option<DateTime<Utc>>,

    /// Set when the request reaches rejected.
    pub rejected_by: Option<Uuid>,
    /// Set when the request reaches rejected.
    pub rejected_at: Option<DateTime<Utc>>,

    /// Set when the request is sent back.
    pub returned_by: Option<Uuid>,
    /// Set when the request is sent back.
    pub returned_at: Option<DateTime<Utc>>,

    /// Set when the request reaches cancelled.
    pub cancelled_by: Option<Uuid>,
    /// Set when the request reaches cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Auto-cancellation deadline.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the request was submitted.
    pub created_at: DateTime<Utc>,

    /// When the request was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequestRow {
    /// Find a request by ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_requests
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find a request by ID with row-level locking.
    ///
    /// Uses `FOR UPDATE`; call inside a transaction so the lock covers the
    /// whole read-decide-write sequence.
    pub async fn find_by_id_for_update<'e>(
        executor: impl sqlx::PgExecutor<'e>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_requests
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Find the non-terminal request for a business object, if any.
    pub async fn find_pending_for_reference(
        pool: &sqlx::PgPool,
        request_type: &str,
        request_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_requests
            WHERE request_type = $1
              AND request_id = $2
              AND status IN ('pending', 'returned')
            ",
        )
        .bind(request_type)
        .bind(request_id)
        .fetch_optional(pool)
        .await
    }

    /// Find pending requests whose expiry deadline has passed.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent sweep workers never
    /// contend on the same rows.
    pub async fn find_expired(
        pool: &sqlx::PgPool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_requests
            WHERE status = 'pending'
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Persist a new request.
    pub async fn insert(pool: &sqlx::PgPool, row: &Self) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO approval_requests (
                id, approval_flow_id, request_type, request_id, current_step,
                status, sub_status, request_data, requested_by, expires_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            ",
        )
        .bind(row.id)
        .bind(row.approval_flow_id)
        .bind(&row.request_type)
        .bind(row.request_id)
        .bind(row.current_step)
        .bind(&row.status)
        .bind(&row.sub_status)
        .bind(&row.request_data)
        .bind(row.requested_by)
        .bind(row.expires_at)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(pool)
        .await
    }

    /// Replace the mutable columns of a request row.
    pub async fn update(pool: &sqlx::PgPool, row: &Self) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE approval_requests
            SET current_step = $2,
                status = $3,
                sub_status = $4,
                approved_by = $5, approved_at = $6,
                rejected_by = $7, rejected_at = $8,
                returned_by = $9, returned_at = $10,
                cancelled_by = $11, cancelled_at = $12,
                updated_at = $13
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(row.id)
        .bind(row.current_step)
        .bind(&row.status)
        .bind(&row.sub_status)
        .bind(row.approved_by)
        .bind(row.approved_at)
        .bind(row.rejected_by)
        .bind(row.rejected_at)
        .bind(row.returned_by)
        .bind(row.returned_at)
        .bind(row.cancelled_by)
        .bind(row.cancelled_at)
        .bind(row.updated_at)
        .fetch_optional(pool)
        .await
    }

    /// Parse the row into the typed domain request.
    pub fn to_request(&self) -> Result<ApprovalRequest, DbError> {
        let status = RequestStatus::from_status_str(&self.status).ok_or(DbError::Corrupted {
            table: "approval_requests",
            message: format!("unknown status '{}'", self.status),
        })?;

        Ok(ApprovalRequest {
            id: self.id,
            approval_flow_id: self.approval_flow_id,
            request_type: self.request_type.clone(),
            request_id: self.request_id,
            current_step: self.current_step,
            status,
            sub_status: self.sub_status.clone(),
            request_data: self.request_data.clone(),
            requested_by: self.requested_by,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            rejected_by: self.rejected_by,
            rejected_at: self.rejected_at,
            returned_by: self.returned_by,
            returned_at: self.returned_at,
            cancelled_by: self.cancelled_by,
            cancelled_at: self.cancelled_at,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Build a row from the typed domain request.
    #[must_use]
    pub fn from_request(request: &ApprovalRequest) -> Self {
        Self {
            id: request.id,
            approval_flow_id: request.approval_flow_id,
            request_type: request.request_type.clone(),
            request_id: request.request_id,
            current_step: request.current_step,
            status: request.status.as_str().to_string(),
            sub_status: request.sub_status.clone(),
            request_data: request.request_data.clone(),
            requested_by: request.requested_by,
            approved_by: request.approved_by,
            approved_at: request.approved_at,
            rejected_by: request.rejected_by,
            rejected_at: request.rejected_at,
            returned_by: request.returned_by,
            returned_at: request.returned_at,
            cancelled_by: request.cancelled_by,
            cancelled_at: request.cancelled_at,
            expires_at: request.expires_at,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}
