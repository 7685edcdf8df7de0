//! Applicable-step resolution.
//!
//! A flow's step list is a template; for one concrete request only the
//! steps whose conditions hold apply (threshold-gated sign-offs drop
//! out). The resolved plan is what the state machine walks.

use serde_json::Value as JsonValue;

use atrium_core::condition;

use crate::error::{Result, WorkflowError};
use crate::types::{ApprovalFlow, ApprovalStep};

/// Compute the ordered step plan for a request.
///
/// Steps whose condition evaluates false against the request data are
/// dropped; the rest are returned ascending by step number. An empty plan
/// is a configuration error: a flow must always have at least one
/// effective step for a real request.
pub fn resolve(flow: &ApprovalFlow, request_data: &JsonValue) -> Result<Vec<ApprovalStep>> {
    let mut steps: Vec<ApprovalStep> = flow
        .approval_steps
        .iter()
        .filter(|step| {
            step.condition
                .as_ref()
                .is_none_or(|tree| condition::evaluate(tree, request_data))
        })
        .cloned()
        .collect();

    steps.sort_by_key(|step| step.step);

    if steps.is_empty() {
        return Err(WorkflowError::NoApplicableSteps { flow_id: flow.id });
    }
    Ok(steps)
}

/// The next applicable step after `current`, if any.
#[must_use]
pub fn next_step(steps: &[ApprovalStep], current: i32) -> Option<&ApprovalStep> {
    steps.iter().find(|step| step.step > current)
}

/// The applicable step with the given number.
#[must_use]
pub fn find_step(steps: &[ApprovalStep], number: i32) -> Option<&ApprovalStep> {
    steps.iter().find(|step| step.step == number)
}
