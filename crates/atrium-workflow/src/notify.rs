//! Step-activation notification hook.
//!
//! The engine fires `step_activated` once each time a step becomes the
//! active one (on submission, on advance, and on resubmission). Delivery
//! and retry are the dispatcher's responsibility; the engine never waits
//! on or reacts to the outcome.

use async_trait::async_trait;

use crate::types::{ApprovalRequest, ApprovalStep};

/// Trait for step-activation dispatchers.
#[async_trait]
pub trait StepNotifier: Send + Sync {
    /// Called once when `step` becomes the active step of `request`.
    async fn step_activated(&self, request: &ApprovalRequest, step: &ApprovalStep);
}

/// Dispatcher that drops notifications. The default when no dispatcher is
/// wired in.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl StepNotifier for NoopNotifier {
    async fn step_activated(&self, _request: &ApprovalRequest, _step: &ApprovalStep) {}
}
