//! Approval history model.
//!
//! Append-only: the table has insert and read queries, nothing else. The
//! trail is the authoritative audit record and the input to
//! step-completion and delegate checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use atrium_workflow::{ApprovalHistory, HistoryAction, NewHistory};

use crate::error::DbError;

/// A stored history entry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApprovalHistoryRow {
    /// Unique identifier for the entry.
    pub id: Uuid,

    /// The request the entry belongs to.
    pub approval_request_id: Uuid,

    /// The step the action applied to.
    pub step: i32,

    /// Action as its canonical string form.
    pub action: String,

    /// The user who acted. Nil for the system actor.
    pub acted_by: Uuid,

    /// When the action happened.
    pub acted_at: DateTime<Utc>,

    /// Free-form comment from the actor.
    pub comment: Option<String>,

    /// Delegate target for delegate entries.
    pub delegate_to: Option<Uuid>,
}

impl ApprovalHistoryRow {
    /// Append an entry.
    pub async fn create(pool: &sqlx::PgPool, input: &NewHistory) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO approval_histories (
                approval_request_id, step, action, acted_by, comment, delegate_to
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            ",
        )
        .bind(input.approval_request_id)
        .bind(input.step)
        .bind(input.action.as_str())
        .bind(input.acted_by)
        .bind(&input.comment)
        .bind(input.delegate_to)
        .fetch_one(pool)
        .await
    }

    /// All entries for a request, oldest first.
    pub async fn find_by_request(
        pool: &sqlx::PgPool,
        request_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM approval_histories
            WHERE approval_request_id = $1
            ORDER BY acted_at ASC, id ASC
            ",
        )
        .bind(request_id)
        .fetch_all(pool)
        .await
    }

    /// Count APPROVE entries for a step of a request.
    pub async fn count_approvals_for_step(
        pool: &sqlx::PgPool,
        request_id: Uuid,
        step: i32,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM approval_histories
            WHERE approval_request_id = $1 AND step = $2 AND action = 'approve'
            ",
        )
        .bind(request_id)
        .bind(step)
        .fetch_one(pool)
        .await
    }

    /// Delegate targets recorded for a step of a request.
    pub async fn find_delegates_for_step(
        pool: &sqlx::PgPool,
        request_id: Uuid,
        step: i32,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT delegate_to FROM approval_histories
            WHERE approval_request_id = $1
              AND step = $2
              AND action = 'delegate'
              AND delegate_to IS NOT NULL
            ",
        )
        .bind(request_id)
        .bind(step)
        .fetch_all(pool)
        .await
    }

    /// Parse the row into the typed domain entry.
    pub fn to_history(&self) -> Result<ApprovalHistory, DbError> {
        let action = HistoryAction::from_action_str(&self.action).ok_or(DbError::Corrupted {
            table: "approval_histories",
            message: format!("unknown action '{}'", self.action),
        })?;

        Ok(ApprovalHistory {
            id: self.id,
            approval_request_id: self.approval_request_id,
            step: self.step,
            action,
            acted_by: self.acted_by,
            acted_at: self.acted_at,
            comment: self.comment.clone(),
            delegate_to: self.delegate_to,
        })
    }
}
