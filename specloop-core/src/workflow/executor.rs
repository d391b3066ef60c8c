//! Step executor trait and types

use crate::models::workflow::ContextPatch;
use crate::workflow::error::ExecutionError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for the external collaborator that performs a step's work
///
/// Implementations run the referenced template against the current context
/// (typically by driving an external language-model-backed tool). Calls must
/// be safe to re-issue: a resumed workflow re-invokes the step that was in
/// flight when the process stopped.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute one step
    ///
    /// # Arguments
    /// * `template_ref` - Reference to the externally-owned step template
    /// * `context` - Current context variables for the run
    ///
    /// # Returns
    /// Context updates to merge into the run, or the execution failure
    async fn execute(
        &self,
        template_ref: &str,
        context: &HashMap<String, String>,
    ) -> Result<ContextPatch, ExecutionError>;
}
