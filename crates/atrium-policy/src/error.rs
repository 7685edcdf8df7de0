//! Error types for the policy engine.

use thiserror::Error;

/// Errors that can occur while managing or loading policies.
///
/// Decision evaluation itself never errors on business data: a missing
/// attribute is a non-match and an unloadable policy set resolves to a
/// default deny.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy document failed structural validation.
    #[error("Invalid policy: {0}")]
    Validation(String),

    /// A system policy may not be modified or deleted.
    #[error("Policy {0} is a system policy and cannot be modified")]
    SystemPolicyImmutable(uuid::Uuid),

    /// The specified policy was not found.
    #[error("Policy not found: {0}")]
    PolicyNotFound(uuid::Uuid),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Convenience Result type for the policy engine.
pub type Result<T> = std::result::Result<T, PolicyError>;
