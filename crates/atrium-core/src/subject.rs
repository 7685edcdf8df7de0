//! The acting subject.
//!
//! A `Subject` is the identity an engine call acts on behalf of. It is
//! always passed explicitly; no engine code reads an ambient current user.
//! Department and position are resolved from the subject's primary
//! employment record by the identity provider and are `None` when the
//! subject has no employment record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The subject of a policy decision or an approval action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique identifier of the user.
    pub user_id: Uuid,

    /// Active role names.
    pub roles: Vec<String>,

    /// System-level grade (e.g. "manager", "admin").
    pub system_level: Option<String>,

    /// Department from the primary employment record.
    pub department_id: Option<Uuid>,

    /// Position from the primary employment record.
    pub position_id: Option<Uuid>,

    /// Whether the subject is a platform administrator.
    pub is_admin: bool,
}

impl Subject {
    /// Create a subject with no roles or employment attributes.
    #[must_use]
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
            system_level: None,
            department_id: None,
            position_id: None,
            is_admin: false,
        }
    }

    /// Add a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Set the system level.
    #[must_use]
    pub fn with_system_level(mut self, level: impl Into<String>) -> Self {
        self.system_level = Some(level.into());
        self
    }

    /// Set the department from the primary employment record.
    #[must_use]
    pub fn with_department(mut self, department_id: Uuid) -> Self {
        self.department_id = Some(department_id);
        self
    }

    /// Set the position from the primary employment record.
    #[must_use]
    pub fn with_position(mut self, position_id: Uuid) -> Self {
        self.position_id = Some(position_id);
        self
    }

    /// Mark the subject as a platform administrator.
    #[must_use]
    pub fn with_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Whether an employment record was resolved for this subject.
    #[must_use]
    pub fn has_employment(&self) -> bool {
        self.department_id.is_some() || self.position_id.is_some()
    }
}
