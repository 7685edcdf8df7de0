//! Database entity models.
//!
//! These models represent the database tables and provide type-safe
//! interactions with PostgreSQL. Enum-valued columns are stored as text
//! and converted through the domain enums' canonical string forms;
//! document columns (condition trees, specs, steps) are JSONB parsed once
//! at the row boundary.

pub mod access_policy;
pub mod approval_flow;
pub mod approval_history;
pub mod approval_request;

pub use access_policy::{AccessPolicyRow, CreateAccessPolicy};
pub use approval_flow::{ApprovalFlowRow, CreateApprovalFlow};
pub use approval_history::ApprovalHistoryRow;
pub use approval_request::ApprovalRequestRow;
