//! The merged decision context.
//!
//! Policy conditions are evaluated against one flat JSON document merging
//! three attribute families under prefixed keys:
//!
//! - `subject.*` - the acting subject (`subject.id`, `subject.roles`,
//!   `subject.system_level`, `subject.department_id`, `subject.position_id`,
//!   `subject.is_admin`)
//! - `resource.*` - attributes of the business object under decision
//! - `env.*` - business-code-scoped environment values supplied by the caller
//!
//! The merge is rebuilt per decision from explicit inputs; nothing is read
//! from ambient state.

use atrium_core::Subject;
use serde_json::{Map, Value as JsonValue};

/// Resource and environment attributes for one policy decision.
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    resource: Map<String, JsonValue>,
    environment: Map<String, JsonValue>,
}

impl DecisionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a resource attribute.
    #[must_use]
    pub fn with_resource_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.resource.insert(name.into(), value.into());
        self
    }

    /// Set all resource attributes from a JSON object.
    #[must_use]
    pub fn with_resource(mut self, resource: &JsonValue) -> Self {
        if let Some(obj) = resource.as_object() {
            self.resource.extend(obj.clone());
        }
        self
    }

    /// Set an environment value.
    #[must_use]
    pub fn with_environment(
        mut self,
        name: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Build the flat document policy conditions are evaluated against.
    #[must_use]
    pub fn merged(&self, subject: &Subject) -> JsonValue {
        let mut doc = Map::new();

        for (key, value) in &self.environment {
            doc.insert(format!("env.{key}"), value.clone());
        }
        for (key, value) in &self.resource {
            doc.insert(format!("resource.{key}"), value.clone());
        }

        doc.insert(
            "subject.id".to_string(),
            JsonValue::String(subject.user_id.to_string()),
        );
        doc.insert(
            "subject.roles".to_string(),
            JsonValue::Array(
                subject
                    .roles
                    .iter()
                    .map(|r| JsonValue::String(r.clone()))
                    .collect(),
            ),
        );
        doc.insert(
            "subject.system_level".to_string(),
            subject
                .system_level
                .as_ref()
                .map_or(JsonValue::Null, |l| JsonValue::String(l.clone())),
        );
        doc.insert(
            "subject.department_id".to_string(),
            subject
                .department_id
                .map_or(JsonValue::Null, |id| JsonValue::String(id.to_string())),
        );
        doc.insert(
            "subject.position_id".to_string(),
            subject
                .position_id
                .map_or(JsonValue::Null, |id| JsonValue::String(id.to_string())),
        );
        doc.insert(
            "subject.is_admin".to_string(),
            JsonValue::Bool(subject.is_admin),
        );

        JsonValue::Object(doc)
    }
}
