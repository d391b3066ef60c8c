//! Workflow definition registry
//!
//! Definitions are declarative, supplied at startup, and treated as
//! read-only: the registry never mutates or persists them.

use crate::models::workflow::{StepDefinition, WorkflowDefinition};
use crate::workflow::validator::WorkflowValidator;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when registering or parsing definitions
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("definition `{name}` failed validation: {reasons}")]
    Invalid { name: String, reasons: String },

    #[error("failed to parse definition document: {0}")]
    Parse(String),
}

/// Declarative document shape for supplying definitions in YAML
#[derive(Debug, Deserialize)]
struct DefinitionDocument {
    workflows: Vec<WorkflowDefinition>,
}

/// Registry of named workflow definitions
pub struct DefinitionRegistry {
    definitions: DashMap<String, Arc<WorkflowDefinition>>,
}

impl DefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
        }
    }

    /// Create a registry pre-loaded with the built-in definitions
    pub fn with_built_ins() -> Self {
        let registry = Self::new();
        for definition in built_in_definitions() {
            // Built-ins are known valid
            let _ = registry.register(definition);
        }
        registry
    }

    /// Register a definition, validating it first
    pub fn register(&self, definition: WorkflowDefinition) -> Result<(), DefinitionError> {
        let result = WorkflowValidator::validate_definition(&definition);
        if !result.is_valid() {
            let reasons = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DefinitionError::Invalid {
                name: definition.name,
                reasons,
            });
        }

        for warning in &result.warnings {
            tracing::warn!(workflow = %definition.name, "{}", warning);
        }

        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Register every definition in a YAML document
    pub fn register_yaml_document(&self, document: &str) -> Result<usize, DefinitionError> {
        let parsed: DefinitionDocument =
            serde_yaml::from_str(document).map_err(|e| DefinitionError::Parse(e.to_string()))?;

        let count = parsed.workflows.len();
        for definition in parsed.workflows {
            self.register(definition)?;
        }
        Ok(count)
    }

    /// Look up a definition by name
    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(name).map(|entry| entry.clone())
    }

    /// Names of all registered definitions
    pub fn list(&self) -> Vec<String> {
        self.definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in workflow definitions
///
/// `spec` is the canonical three-phase development workflow: gather
/// requirements, produce a design (gated behind approval), then break the
/// work into tasks.
pub fn built_in_definitions() -> Vec<WorkflowDefinition> {
    vec![WorkflowDefinition {
        name: "spec".to_string(),
        description: Some("Requirements, design, and task breakdown for a feature".to_string()),
        steps: vec![
            StepDefinition::new("requirements", "Requirements", "templates/requirements"),
            {
                let mut step =
                    StepDefinition::new("design", "Design", "templates/design").with_approval();
                step.approval_message =
                    Some("Review the design document before task breakdown".to_string());
                step
            },
            StepDefinition::new("tasks", "Tasks", "templates/tasks"),
        ],
    }]
}
