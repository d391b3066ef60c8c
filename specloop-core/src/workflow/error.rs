//! Typed failures returned from orchestrator entry points

use thiserror::Error;

/// External step execution failure, wrapping the collaborator-reported cause
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("step execution failed: {message}")]
pub struct ExecutionError {
    /// Collaborator-reported failure description
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors returned from orchestrator entry points
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("a workflow is already running for session `{session_id}`")]
    AlreadyRunning { session_id: String },

    #[error("unknown workflow definition `{name}`")]
    UnknownWorkflow { name: String },

    #[error("snapshot does not match registered definitions: {reason}")]
    StateMismatch { reason: String },

    #[error("step `{step_id}` is missing required context variable `{variable}`")]
    MissingDependency { step_id: String, variable: String },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("`{choice}` is not one of the offered approval options")]
    UnknownApprovalOption { choice: String },

    #[error("no approval request `{request_id}` is pending for session `{session_id}`")]
    NoPendingApproval {
        session_id: String,
        request_id: String,
    },
}
