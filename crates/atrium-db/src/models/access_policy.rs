//! Access policy model.
//!
//! Rows mirror the `access_policies` table; condition and scope documents
//! are JSONB and parse into typed trees via [`AccessPolicyRow::to_policy`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use atrium_core::ConditionNode;
use atrium_policy::{AccessPolicy, PolicyEffect};

use crate::error::DbError;

/// A stored access policy.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccessPolicyRow {
    /// Unique identifier for the policy.
    pub id: Uuid,

    /// Human-readable name.
    pub name: String,

    /// Business domain the policy is scoped to.
    pub business_code: String,

    /// Action the policy covers.
    pub action: String,

    /// Resource type the policy covers.
    pub resource_type: String,

    /// Condition document (JSONB). NULL matches unconditionally.
    pub conditions: Option<JsonValue>,

    /// Optional extra filter document (JSONB).
    pub scope: Option<JsonValue>,

    /// Effect as its canonical string form ("allow" / "deny").
    pub effect: String,

    /// Ordering signal among candidates.
    pub priority: i32,

    /// Inactive policies are never candidates.
    pub is_active: bool,

    /// System policies cannot be modified or deleted.
    pub is_system: bool,

    /// When the policy was created.
    pub created_at: DateTime<Utc>,

    /// When the policy was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccessPolicy {
    pub name: String,
    pub business_code: String,
    pub action: String,
    pub resource_type: String,
    pub conditions: Option<JsonValue>,
    pub scope: Option<JsonValue>,
    pub effect: PolicyEffect,
    pub priority: i32,
    pub is_active: bool,
    pub is_system: bool,
}

impl AccessPolicyRow {
    /// Find a policy by ID.
    pub async fn find_by_id(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM access_policies
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Find the active candidate policies for a request triple, ordered by
    /// priority descending (ties broken by lowest id).
    pub async fn find_candidates(
        pool: &sqlx::PgPool,
        business_code: &str,
        action: &str,
        resource_type: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM access_policies
            WHERE business_code = $1
              AND action = $2
              AND resource_type = $3
              AND is_active = true
            ORDER BY priority DESC, id ASC
            ",
        )
        .bind(business_code)
        .bind(action)
        .bind(resource_type)
        .fetch_all(pool)
        .await
    }

    /// Create a new policy.
    pub async fn create(
        pool: &sqlx::PgPool,
        input: CreateAccessPolicy,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO access_policies (
                name, business_code, action, resource_type,
                conditions, scope, effect, priority, is_active, is_system
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            ",
        )
        .bind(&input.name)
        .bind(&input.business_code)
        .bind(&input.action)
        .bind(&input.resource_type)
        .bind(&input.conditions)
        .bind(&input.scope)
        .bind(input.effect.as_str())
        .bind(input.priority)
        .bind(input.is_active)
        .bind(input.is_system)
        .fetch_one(pool)
        .await
    }

    /// Activate or deactivate a policy.
    pub async fn set_active(
        pool: &sqlx::PgPool,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE access_policies
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

    /// Delete a policy.
    pub async fn delete(pool: &sqlx::PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM access_policies
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Parse the row into the typed domain policy.
    pub fn to_policy(&self) -> Result<AccessPolicy, DbError> {
        let effect = PolicyEffect::from_effect_str(&self.effect).ok_or(DbError::Corrupted {
            table: "access_policies",
            message: format!("unknown effect '{}'", self.effect),
        })?;

        Ok(AccessPolicy {
            id: self.id,
            name: self.name.clone(),
            business_code: self.business_code.clone(),
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            conditions: parse_tree(self.conditions.as_ref(), "access_policies")?,
            scope: parse_tree(self.scope.as_ref(), "access_policies")?,
            effect,
            priority: self.priority,
            is_active: self.is_active,
            is_system: self.is_system,
        })
    }
}

pub(crate) fn parse_tree(
    doc: Option<&JsonValue>,
    table: &'static str,
) -> Result<Option<ConditionNode>, DbError> {
    match doc {
        None => Ok(None),
        Some(JsonValue::Null) => Ok(None),
        Some(doc) => ConditionNode::from_json(doc)
            .map(Some)
            .map_err(|e| DbError::Corrupted {
                table,
                message: format!("unparseable condition document: {e}"),
            }),
    }
}
