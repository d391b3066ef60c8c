//! Workflow definition validation logic

use crate::models::workflow::{ApprovalTimeout, WorkflowDefinition};
use std::collections::HashSet;

/// Validation error for a single field
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: String, message: String) {
        self.errors.push(ValidationError { field, message });
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Workflow definition validator
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Validate a workflow definition
    /// - name must be non-empty
    /// - at least one step
    /// - step ids unique and non-empty
    /// - gated steps offer at least two distinct options
    /// - explicit approval timeouts capped at 3600s
    pub fn validate_definition(definition: &WorkflowDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if definition.name.is_empty() {
            result.add_error(
                "name".to_string(),
                "Workflow name cannot be empty".to_string(),
            );
        }

        if definition.steps.is_empty() {
            result.add_error(
                "steps".to_string(),
                "Workflow must define at least one step".to_string(),
            );
        }

        let mut seen_ids = HashSet::new();
        for step in &definition.steps {
            if step.id.is_empty() {
                result.add_error("steps".to_string(), "Step id cannot be empty".to_string());
                continue;
            }

            if !seen_ids.insert(step.id.as_str()) {
                result.add_error(
                    format!("steps.{}", step.id),
                    format!("Duplicate step id '{}'", step.id),
                );
            }

            if step.template_ref.is_empty() {
                result.add_error(
                    format!("steps.{}", step.id),
                    "template_ref cannot be empty".to_string(),
                );
            }

            if step.requires_approval {
                let distinct: HashSet<&str> =
                    step.approval_options.iter().map(String::as_str).collect();
                if distinct.len() < 2 {
                    result.add_error(
                        format!("steps.{}", step.id),
                        "Approval steps must offer at least two distinct options".to_string(),
                    );
                }
                if distinct.len() != step.approval_options.len() {
                    result.add_error(
                        format!("steps.{}", step.id),
                        "Approval options must be distinct".to_string(),
                    );
                }
                if step.approval_options.iter().any(String::is_empty) {
                    result.add_error(
                        format!("steps.{}", step.id),
                        "Approval options cannot be empty strings".to_string(),
                    );
                }
            }

            match step.approval_timeout {
                ApprovalTimeout::Seconds(secs) if secs > 3600 => {
                    result.add_error(
                        format!("steps.{}", step.id),
                        "approval_timeout cannot exceed 3600 seconds".to_string(),
                    );
                }
                ApprovalTimeout::Seconds(0) => {
                    result.add_warning(format!(
                        "Step '{}' has a zero approval timeout; gates will expire immediately",
                        step.id
                    ));
                }
                _ => {}
            }
        }

        result
    }
}
