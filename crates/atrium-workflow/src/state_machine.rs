//! The approval request lifecycle.
//!
//! Owns every mutation of an [`ApprovalRequest`]: submission, approval,
//! rejection, return, cancellation, delegation, resubmission, and the
//! expiry sweep. Each transition appends its history row before touching
//! request state, so the audit trail is never behind the request.
//!
//! The read-decide-write sequence for one request runs under a
//! per-request async lock: two approvers racing to close the same step
//! serialize here, so a step never double-advances. History appends are
//! commutative and need no such protection. Different requests never
//! contend.

use std::collections::HashMap;
use std::sync::Arc;

use atrium_core::Subject;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::matcher;
use crate::notify::{NoopNotifier, StepNotifier};
use crate::resolver;
use crate::selector;
use crate::store::{FlowStore, HistoryStore, RequestStore};
use crate::types::{
    ApprovalFlow, ApprovalHistory, ApprovalRequest, ApprovalStep, HistoryAction, NewHistory,
    RequestStatus, SubmitRequest, Transition,
};

/// Actor id recorded when the engine itself acts (expiry sweep).
const SYSTEM_ACTOR: Uuid = Uuid::nil();

/// Per-request lock registry.
///
/// The step-advance write is the only non-commutative operation in the
/// engine; this serializes it per request id without any cross-request
/// coupling.
#[derive(Default)]
struct RequestLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RequestLocks {
    async fn acquire(&self, id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Drives approval requests through their flow.
pub struct ApprovalStateMachine {
    flows: Arc<dyn FlowStore>,
    requests: Arc<dyn RequestStore>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn StepNotifier>,
    locks: RequestLocks,
}

impl ApprovalStateMachine {
    /// Create a state machine over the given stores with no notifier.
    pub fn new(
        flows: Arc<dyn FlowStore>,
        requests: Arc<dyn RequestStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            flows,
            requests,
            history,
            notifier: Arc::new(NoopNotifier),
            locks: RequestLocks::default(),
        }
    }

    /// Attach a step-activation dispatcher.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn StepNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Whether `subject` may submit requests through `flow`.
    ///
    /// An empty requester list leaves the flow unrestricted.
    #[must_use]
    pub fn can_create(subject: &Subject, flow: &ApprovalFlow) -> bool {
        flow.requesters.is_empty() || matcher::matches_any(&flow.requesters, subject)
    }

    /// Submit a business object for approval.
    ///
    /// Selects the flow, resolves the step plan, creates the request
    /// `PENDING` at the first applicable step, and fires the activation
    /// notification. `NoApplicableFlow` is a normal outcome;
    /// `DuplicatePendingRequest` refuses a second open request for the
    /// same business object.
    pub async fn submit(&self, subject: &Subject, input: SubmitRequest) -> Result<ApprovalRequest> {
        if let Some(existing) = self
            .requests
            .find_pending_for_reference(&input.request_type, input.request_id)
            .await?
        {
            return Err(WorkflowError::DuplicatePendingRequest {
                request_type: existing.request_type,
                request_id: input.request_id,
            });
        }

        let candidates = self.flows.active_flows_by_type(&input.request_type).await?;
        let flow = selector::select_from(candidates, &input.request_data)
            .ok_or(WorkflowError::NoApplicableFlow)?;

        if !Self::can_create(subject, &flow) {
            return Err(WorkflowError::Forbidden);
        }

        let steps = resolver::resolve(&flow, &input.request_data)?;
        let first = &steps[0];
        let now = Utc::now();

        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            approval_flow_id: flow.id,
            request_type: input.request_type,
            request_id: input.request_id,
            current_step: first.step,
            status: RequestStatus::Pending,
            sub_status: None,
            request_data: input.request_data,
            requested_by: subject.user_id,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            returned_by: None,
            returned_at: None,
            cancelled_by: None,
            cancelled_at: None,
            expires_at: input.expires_at,
            created_at: now,
            updated_at: now,
        };

        self.requests.insert(request.clone()).await?;

        tracing::debug!(
            target: "atrium_workflow",
            request_id = %request.id,
            flow_id = %flow.id,
            step = first.step,
            "approval request submitted"
        );

        self.notifier.step_activated(&request, first).await;
        Ok(request)
    }

    /// Approve the current step.
    ///
    /// Requires the actor to match the step's approvers (or be a recorded
    /// delegate for it). Once the step is complete, the request advances
    /// to the next applicable step or transitions to `APPROVED`.
    /// `expected_step` guards against acting on a stale view: a mismatch
    /// with the actual current step is refused.
    pub async fn approve(
        &self,
        request_id: Uuid,
        subject: &Subject,
        comment: Option<String>,
        expected_step: Option<i32>,
    ) -> Result<Transition> {
        let _guard = self.locks.acquire(request_id).await;

        let (mut request, steps, current) = self.load_pending(request_id, expected_step).await?;
        self.authorize_actor(&request, &current, subject).await?;

        let history = self
            .history
            .append(NewHistory {
                approval_request_id: request_id,
                step: current.step,
                action: HistoryAction::Approve,
                acted_by: subject.user_id,
                comment,
                delegate_to: None,
            })
            .await?;

        // Completion is recomputed from the audit trail, not assumed from
        // the append we just made.
        if !self.is_step_complete(request_id, current.step).await? {
            return Ok(Transition { request, history });
        }

        let now = Utc::now();
        match resolver::next_step(&steps, current.step) {
            Some(next) => {
                request.current_step = next.step;
                request.updated_at = now;
                let request = self.requests.update(request).await?;

                tracing::debug!(
                    target: "atrium_workflow",
                    request_id = %request.id,
                    from_step = current.step,
                    to_step = next.step,
                    "step complete, advanced"
                );

                self.notifier.step_activated(&request, next).await;
                Ok(Transition { request, history })
            }
            None => {
                request.status = RequestStatus::Approved;
                request.approved_by = Some(subject.user_id);
                request.approved_at = Some(now);
                request.updated_at = now;
                let request = self.requests.update(request).await?;

                tracing::debug!(
                    target: "atrium_workflow",
                    request_id = %request.id,
                    "final step complete, request approved"
                );

                Ok(Transition { request, history })
            }
        }
    }

    /// Reject the request. Terminal; a non-empty comment is required.
    pub async fn reject(
        &self,
        request_id: Uuid,
        subject: &Subject,
        comment: String,
        expected_step: Option<i32>,
    ) -> Result<Transition> {
        if comment.trim().is_empty() {
            return Err(WorkflowError::CommentRequired);
        }

        let _guard = self.locks.acquire(request_id).await;

        let (mut request, _steps, current) = self.load_pending(request_id, expected_step).await?;
        self.authorize_actor(&request, &current, subject).await?;

        let history = self
            .history
            .append(NewHistory {
                approval_request_id: request_id,
                step: current.step,
                action: HistoryAction::Reject,
                acted_by: subject.user_id,
                comment: Some(comment),
                delegate_to: None,
            })
            .await?;

        let now = Utc::now();
        request.status = RequestStatus::Rejected;
        request.rejected_by = Some(subject.user_id);
        request.rejected_at = Some(now);
        request.updated_at = now;
        let request = self.requests.update(request).await?;

        tracing::debug!(
            target: "atrium_workflow",
            request_id = %request.id,
            step = current.step,
            "request rejected"
        );

        Ok(Transition { request, history })
    }

    /// Send the request back to an earlier step.
    ///
    /// `return_to_step` must name a step in the applicable plan; without
    /// it the request resumes one step back (never below step 1). The
    /// request stays with the requester in `RETURNED` until resubmitted.
    pub async fn return_request(
        &self,
        request_id: Uuid,
        subject: &Subject,
        comment: Option<String>,
        return_to_step: Option<i32>,
    ) -> Result<Transition> {
        let _guard = self.locks.acquire(request_id).await;

        let (mut request, steps, current) = self.load_pending(request_id, None).await?;
        self.authorize_actor(&request, &current, subject).await?;

        let target = match return_to_step {
            Some(step) => {
                resolver::find_step(&steps, step).ok_or(WorkflowError::UnknownStep { step })?;
                step
            }
            None => std::cmp::max(1, request.current_step - 1),
        };

        let history = self
            .history
            .append(NewHistory {
                approval_request_id: request_id,
                step: current.step,
                action: HistoryAction::Return,
                acted_by: subject.user_id,
                comment,
                delegate_to: None,
            })
            .await?;

        let now = Utc::now();
        request.current_step = target;
        request.status = RequestStatus::Returned;
        request.returned_by = Some(subject.user_id);
        request.returned_at = Some(now);
        request.updated_at = now;
        let request = self.requests.update(request).await?;

        tracing::debug!(
            target: "atrium_workflow",
            request_id = %request.id,
            from_step = current.step,
            resume_step = target,
            "request returned"
        );

        Ok(Transition { request, history })
    }

    /// Cancel the request. Terminal.
    ///
    /// The original requester may cancel while the request is pending or
    /// returned; a current-step approver may cancel while it is pending.
    pub async fn cancel(
        &self,
        request_id: Uuid,
        subject: &Subject,
        comment: Option<String>,
    ) -> Result<Transition> {
        let _guard = self.locks.acquire(request_id).await;

        let mut request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;

        if request.status.is_terminal() {
            return Err(WorkflowError::InvalidState {
                status: request.status,
            });
        }

        let is_requester = request.requested_by == subject.user_id;
        let acted_step = request.current_step;
        if !is_requester {
            if !request.status.is_pending() {
                return Err(WorkflowError::InvalidState {
                    status: request.status,
                });
            }
            let (_, _, current) = self.load_pending(request_id, None).await?;
            self.authorize_actor(&request, &current, subject).await?;
        }

        let history = self
            .history
            .append(NewHistory {
                approval_request_id: request_id,
                step: acted_step,
                action: HistoryAction::Cancel,
                acted_by: subject.user_id,
                comment,
                delegate_to: None,
            })
            .await?;

        let now = Utc::now();
        request.status = RequestStatus::Cancelled;
        request.cancelled_by = Some(subject.user_id);
        request.cancelled_at = Some(now);
        request.updated_at = now;
        let request = self.requests.update(request).await?;

        tracing::debug!(
            target: "atrium_workflow",
            request_id = %request.id,
            by_requester = is_requester,
            "request cancelled"
        );

        Ok(Transition { request, history })
    }

    /// Hand the current step to a named delegate.
    ///
    /// The delegate may then act on this step as if listed among its
    /// approvers. Recorded in history; the request itself is unchanged.
    pub async fn delegate(
        &self,
        request_id: Uuid,
        subject: &Subject,
        delegate_to: Uuid,
        comment: Option<String>,
    ) -> Result<Transition> {
        let _guard = self.locks.acquire(request_id).await;

        let (request, _steps, current) = self.load_pending(request_id, None).await?;
        self.authorize_actor(&request, &current, subject).await?;

        let history = self
            .history
            .append(NewHistory {
                approval_request_id: request_id,
                step: current.step,
                action: HistoryAction::Delegate,
                acted_by: subject.user_id,
                comment,
                delegate_to: Some(delegate_to),
            })
            .await?;

        tracing::debug!(
            target: "atrium_workflow",
            request_id = %request.id,
            step = current.step,
            delegate = %delegate_to,
            "step delegated"
        );

        Ok(Transition { request, history })
    }

    /// Resubmit a returned request.
    ///
    /// Only the original requester may resubmit. The request re-enters
    /// `PENDING` at the carried resume step (or the first applicable step
    /// at or after it, if the plan changed) and the step is re-activated.
    pub async fn resubmit(&self, request_id: Uuid, subject: &Subject) -> Result<Transition> {
        let _guard = self.locks.acquire(request_id).await;

        let mut request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;

        if request.status != RequestStatus::Returned {
            return Err(WorkflowError::InvalidState {
                status: request.status,
            });
        }
        if request.requested_by != subject.user_id {
            return Err(WorkflowError::Forbidden);
        }

        let flow = self
            .flows
            .find_flow(request.approval_flow_id)
            .await?
            .ok_or(WorkflowError::FlowNotFound(request.approval_flow_id))?;
        let steps = resolver::resolve(&flow, &request.request_data)?;
        let resume = steps
            .iter()
            .find(|step| step.step >= request.current_step)
            .unwrap_or(&steps[0])
            .clone();

        let history = self
            .history
            .append(NewHistory {
                approval_request_id: request_id,
                step: resume.step,
                action: HistoryAction::Resubmit,
                acted_by: subject.user_id,
                comment: None,
                delegate_to: None,
            })
            .await?;

        let now = Utc::now();
        request.current_step = resume.step;
        request.status = RequestStatus::Pending;
        request.sub_status = None;
        request.updated_at = now;
        let request = self.requests.update(request).await?;

        tracing::debug!(
            target: "atrium_workflow",
            request_id = %request.id,
            step = resume.step,
            "returned request resubmitted"
        );

        self.notifier.step_activated(&request, &resume).await;
        Ok(Transition { request, history })
    }

    /// Cancel pending requests whose expiry deadline has passed.
    ///
    /// Called by an external scheduled sweep. Returns the number of
    /// requests cancelled; each is re-checked under its lock so a racing
    /// approval is never overwritten.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let overdue = self.requests.find_expired(now).await?;
        let mut swept = 0;

        for candidate in overdue {
            let _guard = self.locks.acquire(candidate.id).await;

            let Some(mut request) = self.requests.get(candidate.id).await? else {
                continue;
            };
            if !request.status.is_pending()
                || !request.expires_at.is_some_and(|deadline| deadline <= now)
            {
                continue;
            }

            self.history
                .append(NewHistory {
                    approval_request_id: request.id,
                    step: request.current_step,
                    action: HistoryAction::Cancel,
                    acted_by: SYSTEM_ACTOR,
                    comment: Some("expired".to_string()),
                    delegate_to: None,
                })
                .await?;

            request.status = RequestStatus::Cancelled;
            request.sub_status = Some("expired".to_string());
            request.cancelled_at = Some(now);
            request.updated_at = now;
            self.requests.update(request).await?;
            swept += 1;
        }

        if swept > 0 {
            tracing::debug!(target: "atrium_workflow", count = swept, "expired requests swept");
        }
        Ok(swept)
    }

    /// Whether a step of a request is complete.
    ///
    /// A step is complete once at least one APPROVE history row exists
    /// for it: any one subject matching any approver spec closes the
    /// step.
    pub async fn is_step_complete(&self, request_id: Uuid, step: i32) -> Result<bool> {
        Ok(self.history.approvals_for_step(request_id, step).await? >= 1)
    }

    /// The full audit trail of a request, oldest first.
    pub async fn history_for(&self, request_id: Uuid) -> Result<Vec<ApprovalHistory>> {
        self.history.list_for_request(request_id).await
    }

    /// Load a pending request, its step plan, and its current step.
    async fn load_pending(
        &self,
        request_id: Uuid,
        expected_step: Option<i32>,
    ) -> Result<(ApprovalRequest, Vec<ApprovalStep>, ApprovalStep)> {
        let request = self
            .requests
            .get(request_id)
            .await?
            .ok_or(WorkflowError::RequestNotFound(request_id))?;

        if !request.status.is_pending() {
            return Err(WorkflowError::InvalidState {
                status: request.status,
            });
        }
        if let Some(expected) = expected_step {
            if expected != request.current_step {
                return Err(WorkflowError::StepAlreadyAdvanced {
                    expected,
                    current: request.current_step,
                });
            }
        }

        let flow = self
            .flows
            .find_flow(request.approval_flow_id)
            .await?
            .ok_or(WorkflowError::FlowNotFound(request.approval_flow_id))?;
        let steps = resolver::resolve(&flow, &request.request_data)?;
        let current = resolver::find_step(&steps, request.current_step)
            .cloned()
            .ok_or(WorkflowError::UnknownStep {
                step: request.current_step,
            })?;

        Ok((request, steps, current))
    }

    /// Check the actor against the step's approvers and recorded delegates.
    async fn authorize_actor(
        &self,
        request: &ApprovalRequest,
        step: &ApprovalStep,
        subject: &Subject,
    ) -> Result<()> {
        if matcher::matches_any(&step.approvers, subject) {
            return Ok(());
        }
        let delegates = self
            .history
            .delegates_for_step(request.id, step.step)
            .await?;
        if delegates.contains(&subject.user_id) {
            return Ok(());
        }
        Err(WorkflowError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryFlowStore, InMemoryHistoryStore, InMemoryRequestStore};
    use crate::types::SubjectSpec;
    use serde_json::json;

    struct Fixture {
        machine: ApprovalStateMachine,
        flows: Arc<InMemoryFlowStore>,
    }

    fn two_step_flow() -> ApprovalFlow {
        ApprovalFlow {
            id: Uuid::new_v4(),
            name: "Estimate approval".to_string(),
            flow_type: "estimate".to_string(),
            conditions: None,
            requesters: vec![],
            approval_steps: vec![
                ApprovalStep {
                    step: 1,
                    name: "Manager sign-off".to_string(),
                    approvers: vec![SubjectSpec::system_level("manager")],
                    condition: None,
                },
                ApprovalStep {
                    step: 2,
                    name: "Admin sign-off".to_string(),
                    approvers: vec![SubjectSpec::system_level("admin")],
                    condition: None,
                },
            ],
            priority: 1,
            is_active: true,
            is_system: false,
        }
    }

    async fn fixture() -> Fixture {
        let flows = Arc::new(InMemoryFlowStore::new());
        flows.insert(two_step_flow()).await.unwrap();
        let machine = ApprovalStateMachine::new(
            flows.clone(),
            Arc::new(InMemoryRequestStore::new()),
            Arc::new(InMemoryHistoryStore::new()),
        );
        Fixture { machine, flows }
    }

    fn submit_input() -> SubmitRequest {
        SubmitRequest {
            request_type: "estimate".to_string(),
            request_id: Uuid::new_v4(),
            request_data: json!({"amount": 1500}),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_submit_starts_at_first_step() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());

        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.current_step, 1);
        assert_eq!(request.requested_by, requester.user_id);
    }

    #[tokio::test]
    async fn test_submit_duplicate_pending_refused() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let input = submit_input();

        fx.machine.submit(&requester, input.clone()).await.unwrap();
        let err = fx.machine.submit(&requester, input).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicatePendingRequest { .. }));
    }

    #[tokio::test]
    async fn test_submit_without_matching_flow() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let mut input = submit_input();
        input.request_type = "purchase_order".to_string();

        let err = fx.machine.submit(&requester, input).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoApplicableFlow));
    }

    #[tokio::test]
    async fn test_submit_requires_requester_match() {
        let flows = Arc::new(InMemoryFlowStore::new());
        let mut flow = two_step_flow();
        flow.requesters = vec![SubjectSpec::system_level("staff")];
        flows.insert(flow).await.unwrap();
        let machine = ApprovalStateMachine::new(
            flows,
            Arc::new(InMemoryRequestStore::new()),
            Arc::new(InMemoryHistoryStore::new()),
        );

        let outsider = Subject::new(Uuid::new_v4());
        let err = machine.submit(&outsider, submit_input()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden));

        let staff = Subject::new(Uuid::new_v4()).with_system_level("staff");
        assert!(machine.submit(&staff, submit_input()).await.is_ok());
    }

    #[tokio::test]
    async fn test_approve_requires_approver_match() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let stranger = Subject::new(Uuid::new_v4());
        let err = fx
            .machine
            .approve(request.id, &stranger, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden));
    }

    #[tokio::test]
    async fn test_approve_advances_then_completes() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let admin = Subject::new(Uuid::new_v4()).with_system_level("admin");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let t1 = fx
            .machine
            .approve(request.id, &manager, Some("looks good".to_string()), None)
            .await
            .unwrap();
        assert_eq!(t1.request.status, RequestStatus::Pending);
        assert_eq!(t1.request.current_step, 2);
        assert_eq!(t1.history.step, 1);
        assert_eq!(t1.history.action, HistoryAction::Approve);

        let t2 = fx
            .machine
            .approve(request.id, &admin, None, None)
            .await
            .unwrap();
        assert_eq!(t2.request.status, RequestStatus::Approved);
        assert_eq!(t2.request.approved_by, Some(admin.user_id));
        assert!(t2.request.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_expected_step_refused() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let second_manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        fx.machine
            .approve(request.id, &manager, None, Some(1))
            .await
            .unwrap();

        // The second manager still believes step 1 is current.
        let err = fx
            .machine
            .approve(request.id, &second_manager, None, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StepAlreadyAdvanced {
                expected: 1,
                current: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_reject_requires_comment() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let err = fx
            .machine
            .reject(request.id, &manager, "   ".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::CommentRequired));
    }

    #[tokio::test]
    async fn test_terminal_request_refuses_actions() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        fx.machine
            .reject(request.id, &manager, "budget exceeded".to_string(), None)
            .await
            .unwrap();

        let err = fx
            .machine
            .approve(request.id, &manager, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                status: RequestStatus::Rejected
            }
        ));
    }

    #[tokio::test]
    async fn test_return_defaults_one_step_back() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let admin = Subject::new(Uuid::new_v4()).with_system_level("admin");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        fx.machine
            .approve(request.id, &manager, None, None)
            .await
            .unwrap();
        let t = fx
            .machine
            .return_request(request.id, &admin, Some("redo totals".to_string()), None)
            .await
            .unwrap();

        assert_eq!(t.request.status, RequestStatus::Returned);
        assert_eq!(t.request.current_step, 1);
        assert_eq!(t.history.action, HistoryAction::Return);
        assert_eq!(t.history.step, 2);
    }

    #[tokio::test]
    async fn test_return_never_goes_below_step_one() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let t = fx
            .machine
            .return_request(request.id, &manager, None, None)
            .await
            .unwrap();
        assert_eq!(t.request.current_step, 1);
    }

    #[tokio::test]
    async fn test_return_to_unknown_step_refused() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let err = fx
            .machine
            .return_request(request.id, &manager, None, Some(9))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStep { step: 9 }));
    }

    #[tokio::test]
    async fn test_cancel_permissions() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let stranger = Subject::new(Uuid::new_v4());
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let err = fx
            .machine
            .cancel(request.id, &stranger, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden));

        let t = fx.machine.cancel(request.id, &requester, None).await.unwrap();
        assert_eq!(t.request.status, RequestStatus::Cancelled);
        assert_eq!(t.request.cancelled_by, Some(requester.user_id));
    }

    #[tokio::test]
    async fn test_current_step_approver_may_cancel() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let t = fx
            .machine
            .cancel(request.id, &manager, Some("withdrawn by policy".to_string()))
            .await
            .unwrap();
        assert_eq!(t.request.status, RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_delegate_grants_step_access() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let deputy = Subject::new(Uuid::new_v4());
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        // Deputy cannot act before delegation.
        assert!(matches!(
            fx.machine
                .approve(request.id, &deputy, None, None)
                .await
                .unwrap_err(),
            WorkflowError::Forbidden
        ));

        fx.machine
            .delegate(request.id, &manager, deputy.user_id, None)
            .await
            .unwrap();

        let t = fx
            .machine
            .approve(request.id, &deputy, None, None)
            .await
            .unwrap();
        assert_eq!(t.request.current_step, 2);
    }

    #[tokio::test]
    async fn test_resubmit_after_return() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        fx.machine
            .return_request(request.id, &manager, None, None)
            .await
            .unwrap();

        // Only the requester may resubmit.
        assert!(matches!(
            fx.machine.resubmit(request.id, &manager).await.unwrap_err(),
            WorkflowError::Forbidden
        ));

        let t = fx.machine.resubmit(request.id, &requester).await.unwrap();
        assert_eq!(t.request.status, RequestStatus::Pending);
        assert_eq!(t.request.current_step, 1);
        assert_eq!(t.history.action, HistoryAction::Resubmit);
    }

    #[tokio::test]
    async fn test_sweep_expired_cancels_overdue_only() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());

        let mut overdue = submit_input();
        overdue.expires_at = Some(Utc::now() - chrono::Duration::hours(2));
        let overdue = fx.machine.submit(&requester, overdue).await.unwrap();

        let fresh = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let swept = fx.machine.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(swept, 1);

        let trail = fx.machine.history_for(overdue.id).await.unwrap();
        let cancel = trail.last().unwrap();
        assert_eq!(cancel.action, HistoryAction::Cancel);
        assert_eq!(cancel.acted_by, Uuid::nil());

        // The fresh request is untouched.
        let err = fx.machine.resubmit(fresh.id, &requester).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidState {
                status: RequestStatus::Pending
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_flow_is_configuration_error() {
        let fx = fixture().await;
        let requester = Subject::new(Uuid::new_v4());
        let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        // Simulate an administrator deleting the flow out from under the request.
        fx.flows.remove(request.approval_flow_id).await.unwrap();

        let err = fx
            .machine
            .approve(request.id, &manager, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::FlowNotFound(_)));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_racing_approvers_do_not_double_advance() {
        let fx = Arc::new(fixture().await);
        let requester = Subject::new(Uuid::new_v4());
        let request = fx.machine.submit(&requester, submit_input()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let fx = fx.clone();
            let manager = Subject::new(Uuid::new_v4()).with_system_level("manager");
            let id = request.id;
            handles.push(tokio::spawn(async move {
                fx.machine.approve(id, &manager, None, Some(1)).await
            }));
        }

        let mut advanced = 0;
        let mut stale = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(t) => {
                    assert_eq!(t.request.current_step, 2);
                    advanced += 1;
                }
                Err(WorkflowError::StepAlreadyAdvanced { .. }) => stale += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // Exactly one approval advanced the step; the rest saw a stale view.
        assert_eq!(advanced, 1);
        assert_eq!(stale, 7);
    }
}
