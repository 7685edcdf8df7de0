//! Multi-step approval workflows for the atrium platform.
//!
//! When a business object is submitted for approval, the engine selects
//! the applicable flow by its business conditions, resolves the ordered
//! step plan for this request's data, and drives the request through it
//! as actors approve, reject, return, cancel, or delegate. Every action
//! lands in an append-only history trail, and the trail — not request
//! state — is what step completion and delegate resolution read back.
//!
//! # Components
//!
//! - [`types`] - flows, steps, subject specs, requests, and history rows
//! - [`matcher`] - subject matching against requester/approver spec lists
//! - [`selector`] - flow selection by type, conditions, and priority
//! - [`resolver`] - per-request applicable-step resolution
//! - [`state_machine`] - the only mutating surface: [`state_machine::ApprovalStateMachine`]
//! - [`store`] - storage traits plus in-memory implementations
//! - [`notify`] - the step-activation dispatcher hook

pub mod error;
pub mod matcher;
pub mod notify;
pub mod resolver;
pub mod selector;
pub mod state_machine;
pub mod store;
pub mod types;

pub use error::{Result, WorkflowError};
pub use notify::{NoopNotifier, StepNotifier};
pub use selector::ApprovalFlowSelector;
pub use state_machine::ApprovalStateMachine;
pub use store::{
    FlowStore, HistoryStore, InMemoryFlowStore, InMemoryHistoryStore, InMemoryRequestStore,
    RequestStore,
};
pub use types::{
    ApprovalFlow, ApprovalHistory, ApprovalRequest, ApprovalStep, HistoryAction, NewHistory,
    RequestStatus, SubjectRule, SubjectSpec, SubmitRequest, Transition,
};
