//! Error types for the approval workflow engine.

use thiserror::Error;
use uuid::Uuid;

use crate::types::RequestStatus;

/// Errors returned by the workflow engine.
///
/// `FlowNotFound`, `NoApplicableSteps`, and `UnknownStep` signal a data
/// setup problem an administrator must correct; they are never retried.
/// `NoApplicableFlow` is a normal business outcome of submission, not a
/// defect.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The actor is not an eligible requester or approver for this action.
    #[error("Actor is not authorized for this action")]
    Forbidden,

    /// The action requires a different request status.
    #[error("Request cannot be actioned in status '{status}'")]
    InvalidState {
        /// The request's current status.
        status: RequestStatus,
    },

    /// The actor acted on a stale view of the request.
    #[error("Step already advanced: expected step {expected}, current step is {current}")]
    StepAlreadyAdvanced {
        /// The step the actor believed was current.
        expected: i32,
        /// The step that is actually current.
        current: i32,
    },

    /// The approval request was not found.
    #[error("Approval request not found: {0}")]
    RequestNotFound(Uuid),

    /// No active flow matches the submitted request. A normal outcome.
    #[error("No approval flow matches this request")]
    NoApplicableFlow,

    /// The flow referenced by a request no longer exists.
    #[error("Approval flow not found: {0}")]
    FlowNotFound(Uuid),

    /// Every step of the flow was filtered out for this request's data.
    #[error("Flow {flow_id} has no applicable steps for this request")]
    NoApplicableSteps {
        /// The flow whose step plan came up empty.
        flow_id: Uuid,
    },

    /// The request points at a step that is not in the applicable plan.
    #[error("Step {step} is not part of the applicable step plan")]
    UnknownStep {
        /// The missing step number.
        step: i32,
    },

    /// A pending request already exists for the same business object.
    #[error("A pending approval request already exists for {request_type} {request_id}")]
    DuplicatePendingRequest {
        /// Business domain of the duplicate.
        request_type: String,
        /// Business object reference of the duplicate.
        request_id: Uuid,
    },

    /// The action requires a non-empty comment.
    #[error("A comment is required for this action")]
    CommentRequired,

    /// A flow or condition document failed structural validation.
    #[error("Invalid flow definition: {0}")]
    Validation(String),

    /// A system flow may not be modified or deleted.
    #[error("Flow {0} is a system flow and cannot be modified")]
    SystemFlowImmutable(Uuid),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    /// Whether this error signals broken flow configuration rather than a
    /// rejected action.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::FlowNotFound(_) | Self::NoApplicableSteps { .. } | Self::UnknownStep { .. }
        )
    }
}

/// Convenience Result type for the workflow engine.
pub type Result<T> = std::result::Result<T, WorkflowError>;
