//! PostgreSQL persistence for the atrium engines.
//!
//! One model per table, written against raw SQL with `sqlx::query_as`.
//! Condition trees, subject specs, and step lists live in JSONB columns
//! and are parsed once into the typed domain structures at the row
//! boundary. The [`stores`] module adapts these models to the
//! `atrium-policy` and `atrium-workflow` store traits and is the
//! authoring surface that runs document validation and the system-record
//! immutability guard.

pub mod error;
pub mod migrations;
pub mod models;
pub mod stores;

pub use error::{DbError, Result};
pub use migrations::run_migrations;
pub use models::{
    AccessPolicyRow, ApprovalFlowRow, ApprovalHistoryRow, ApprovalRequestRow, CreateAccessPolicy,
    CreateApprovalFlow,
};
pub use stores::{PgFlowStore, PgHistoryStore, PgPolicyStore, PgRequestStore};
