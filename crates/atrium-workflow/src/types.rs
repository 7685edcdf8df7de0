//! Approval workflow domain types.
//!
//! A flow is a reusable template: selection conditions, eligible
//! requesters, and an ordered list of steps, each naming its approvers and
//! an optional applicability condition. A request is one traversal of a
//! flow by a business object; history rows are its append-only audit
//! trail. Flows own their steps and specs outright; none of them has an
//! independent lifecycle.

use atrium_core::{condition, ConditionNode, Subject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{Result, WorkflowError};

/// A rule matching subjects for requester or approver eligibility.
///
/// Serialized as `{"type": "system_level", "value": "manager",
/// "display_name": "..."}`. The closed enum keeps spec-type dispatch
/// exhaustive at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSpec {
    /// The matching rule.
    #[serde(flatten)]
    pub rule: SubjectRule,

    /// Label for admin UIs; never used in matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// The matching rule of a [`SubjectSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SubjectRule {
    /// Matches one specific user.
    User(Uuid),
    /// Matches any subject at the given system level.
    SystemLevel(String),
    /// Matches any subject whose primary employment is in the department.
    Department(Uuid),
    /// Matches any subject holding the position.
    Position(Uuid),
}

impl SubjectRule {
    /// Whether this rule matches the subject.
    ///
    /// Department and position rules require a resolved employment record;
    /// without one they never match.
    #[must_use]
    pub fn matches(&self, subject: &Subject) -> bool {
        match self {
            Self::User(id) => *id == subject.user_id,
            Self::SystemLevel(level) => subject.system_level.as_deref() == Some(level.as_str()),
            Self::Department(id) => subject.department_id == Some(*id),
            Self::Position(id) => subject.position_id == Some(*id),
        }
    }
}

impl SubjectSpec {
    /// Whether this spec matches the subject.
    #[must_use]
    pub fn matches(&self, subject: &Subject) -> bool {
        self.rule.matches(subject)
    }

    /// Spec matching one specific user.
    #[must_use]
    pub fn user(id: Uuid) -> Self {
        Self {
            rule: SubjectRule::User(id),
            display_name: None,
        }
    }

    /// Spec matching a system level.
    #[must_use]
    pub fn system_level(level: impl Into<String>) -> Self {
        Self {
            rule: SubjectRule::SystemLevel(level.into()),
            display_name: None,
        }
    }

    /// Spec matching a department.
    #[must_use]
    pub fn department(id: Uuid) -> Self {
        Self {
            rule: SubjectRule::Department(id),
            display_name: None,
        }
    }

    /// Spec matching a position.
    #[must_use]
    pub fn position(id: Uuid) -> Self {
        Self {
            rule: SubjectRule::Position(id),
            display_name: None,
        }
    }
}

/// One stage of an approval flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    /// Position in the chain. Unique within a flow, evaluated ascending;
    /// step 0 is a valid pre-step.
    pub step: i32,

    /// Human-readable name.
    pub name: String,

    /// Who may act on this step. Any single match suffices.
    pub approvers: Vec<SubjectSpec>,

    /// Applicability condition over the request data. Absent means the
    /// step always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionNode>,
}

/// A reusable approval flow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    /// Unique identifier for the flow.
    pub id: Uuid,

    /// Human-readable name.
    pub name: String,

    /// Business domain the flow serves (e.g. "estimate").
    pub flow_type: String,

    /// Selection condition over the request data. Absent matches
    /// unconditionally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionNode>,

    /// Who may submit requests through this flow. Empty means anyone.
    pub requesters: Vec<SubjectSpec>,

    /// Ordered approval steps.
    pub approval_steps: Vec<ApprovalStep>,

    /// Selection precedence among matching flows: smaller wins.
    pub priority: i32,

    /// Inactive flows are never selected.
    pub is_active: bool,

    /// System flows cannot be modified or deleted.
    pub is_system: bool,
}

impl ApprovalFlow {
    /// Validate the flow definition at authoring time.
    ///
    /// Checks step uniqueness, non-empty approver lists, and all attached
    /// condition trees.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.approval_steps.is_empty() {
            errors.push("flow must define at least one step".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.approval_steps {
            if step.step < 0 {
                errors.push(format!("step {} has a negative step number", step.step));
            }
            if !seen.insert(step.step) {
                errors.push(format!("duplicate step number {}", step.step));
            }
            if step.approvers.is_empty() {
                errors.push(format!("step {} has no approvers", step.step));
            }
            if let Some(tree) = &step.condition {
                let report = condition::validate_tree(tree);
                if !report.valid {
                    errors.push(format!(
                        "step {} condition: {}",
                        step.step,
                        report.errors.join("; ")
                    ));
                }
            }
        }

        if let Some(tree) = &self.conditions {
            let report = condition::validate_tree(tree);
            if !report.valid {
                errors.push(format!("selection condition: {}", report.errors.join("; ")));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Validation(errors.join("; ")))
        }
    }
}

/// Status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Awaiting action at `current_step`.
    Pending,
    /// Every applicable step approved. Terminal.
    Approved,
    /// Rejected by an approver. Terminal.
    Rejected,
    /// Sent back; `current_step` is the step to resume from.
    Returned,
    /// Cancelled by the requester, an approver, or the expiry sweep. Terminal.
    Cancelled,
}

impl RequestStatus {
    /// Check if the request is awaiting approver action.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Check if the request is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    /// The canonical string form used in storage and serialization.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the canonical string form.
    #[must_use]
    pub fn from_status_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "returned" => Some(Self::Returned),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approval traversal of a business object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique identifier for the request.
    pub id: Uuid,

    /// The flow driving this request.
    pub approval_flow_id: Uuid,

    /// Business domain of the referenced object (e.g. "estimate").
    pub request_type: String,

    /// Reference to the business object under approval.
    pub request_id: Uuid,

    /// The currently active step number (or the resume step while returned).
    pub current_step: i32,

    /// Lifecycle status.
    pub status: RequestStatus,

    /// Secondary status annotation (e.g. "expired" on a swept request).
    pub sub_status: Option<String>,

    /// Snapshot of the business data used for condition evaluation.
    pub request_data: JsonValue,

    /// The user who submitted the request.
    pub requested_by: Uuid,

    /// Set when the request reaches `Approved`.
    pub approved_by: Option<Uuid>,
    /// Set when the request reaches `Approved`.
    pub approved_at: Option<DateTime<Utc>>,

    /// Set when the request reaches `Rejected`.
    pub rejected_by: Option<Uuid>,
    /// Set when the request reaches `Rejected`.
    pub rejected_at: Option<DateTime<Utc>>,

    /// Set when the request is sent back.
    pub returned_by: Option<Uuid>,
    /// Set when the request is sent back.
    pub returned_at: Option<DateTime<Utc>>,

    /// Set when the request reaches `Cancelled`.
    pub cancelled_by: Option<Uuid>,
    /// Set when the request reaches `Cancelled`.
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Auto-cancellation deadline evaluated by the expiry sweep.
    pub expires_at: Option<DateTime<Utc>>,

    /// When the request was submitted.
    pub created_at: DateTime<Utc>,

    /// When the request was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Actions recorded in the approval history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Step approval.
    Approve,
    /// Request rejection.
    Reject,
    /// Request sent back to an earlier step.
    Return,
    /// Request cancellation.
    Cancel,
    /// Step handed to a named delegate.
    Delegate,
    /// Returned request resubmitted by the requester.
    Resubmit,
}

impl HistoryAction {
    /// The canonical string form used in storage and serialization.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Return => "return",
            Self::Cancel => "cancel",
            Self::Delegate => "delegate",
            Self::Resubmit => "resubmit",
        }
    }

    /// Parse the canonical string form.
    #[must_use]
    pub fn from_action_str(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "return" => Some(Self::Return),
            "cancel" => Some(Self::Cancel),
            "delegate" => Some(Self::Delegate),
            "resubmit" => Some(Self::Resubmit),
            _ => None,
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only audit trail entry.
///
/// Never mutated or deleted; step-completion checks and delegate
/// resolution read back from these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalHistory {
    /// Unique identifier for the entry.
    pub id: Uuid,

    /// The request this entry belongs to.
    pub approval_request_id: Uuid,

    /// The step the action applied to.
    pub step: i32,

    /// The recorded action.
    pub action: HistoryAction,

    /// The user who acted. Nil for the system actor (expiry sweep).
    pub acted_by: Uuid,

    /// When the action happened.
    pub acted_at: DateTime<Utc>,

    /// Free-form comment from the actor.
    pub comment: Option<String>,

    /// Delegate target for [`HistoryAction::Delegate`] entries.
    pub delegate_to: Option<Uuid>,
}

/// Input for appending a history entry; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewHistory {
    /// The request the entry belongs to.
    pub approval_request_id: Uuid,
    /// The step the action applies to.
    pub step: i32,
    /// The action to record.
    pub action: HistoryAction,
    /// The acting user.
    pub acted_by: Uuid,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Delegate target for delegate entries.
    pub delegate_to: Option<Uuid>,
}

/// Input for submitting a business object for approval.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Business domain of the object; also selects the flow type.
    pub request_type: String,
    /// Reference to the business object.
    pub request_id: Uuid,
    /// Snapshot of the business data for condition evaluation.
    pub request_data: JsonValue,
    /// Optional auto-cancellation deadline.
    pub expires_at: Option<DateTime<Utc>>,
}

/// The outcome of a state-machine transition.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The request after the transition.
    pub request: ApprovalRequest,
    /// The history row the transition appended.
    pub history: ApprovalHistory,
}
