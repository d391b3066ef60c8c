//! Workflow orchestration data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Context variable key that receives the caller's initial input
pub const INPUT_VARIABLE: &str = "input";

/// Key/value updates a step contributes back to the run context
pub type ContextPatch = HashMap<String, String>;

/// Status of a workflow instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but not yet started
    Idle,
    /// A step is executing
    Running,
    /// Suspended at an approval gate
    WaitingApproval,
    /// All steps finished
    Completed,
    /// A step reported an error
    Failed,
    /// Cancelled by the caller or a rejected approval
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal states end the run and accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Active states count as "running" for session exclusivity
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Running | WorkflowStatus::WaitingApproval
        )
    }
}

/// Inactivity timeout applied to a step's approval gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTimeout {
    /// Use the orchestrator's configured default
    #[default]
    Default,
    /// Wait indefinitely for a resolution
    Disabled,
    /// Explicit deadline in seconds
    Seconds(u32),
}

/// One unit of externally-executed work within a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepDefinition {
    /// Step identifier (unique within the workflow)
    pub id: String,
    /// Human-readable step name
    pub name: String,
    /// Reference to the externally-owned template driving this step
    pub template_ref: String,
    /// Whether the step is gated behind an approval before advancing
    #[serde(default)]
    pub requires_approval: bool,
    /// Message shown with the approval request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_message: Option<String>,
    /// Ordered approval options offered to the decider
    #[serde(default = "default_approval_options")]
    pub approval_options: Vec<String>,
    /// Inactivity timeout for this step's approval gate
    #[serde(default)]
    pub approval_timeout: ApprovalTimeout,
    /// Context variables that must be present before the step may start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_variables: Vec<String>,
}

fn default_approval_options() -> Vec<String> {
    vec![
        "approve".to_string(),
        "reject".to_string(),
        "modify".to_string(),
    ]
}

impl StepDefinition {
    /// Create a step with default approval settings
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        template_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            template_ref: template_ref.into(),
            requires_approval: false,
            approval_message: None,
            approval_options: default_approval_options(),
            approval_timeout: ApprovalTimeout::Default,
            required_variables: Vec::new(),
        }
    }

    /// Mark the step as requiring approval before advancing
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// Workflow definition - immutable template for runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered steps executed one at a time
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Number of steps in the definition
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Step at the given index, if any
    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }
}

/// Live workflow instance, owned and mutated exclusively by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Unique identifier for this run
    pub workflow_id: Uuid,
    /// Name of the workflow definition
    pub definition_name: String,
    /// Conversation session this run belongs to
    pub session_id: String,
    /// Index of the step currently executing or awaiting approval (0-based)
    pub current_step_index: usize,
    /// Overall run status
    pub status: WorkflowStatus,
    /// Key/value context threaded through steps
    pub context_variables: HashMap<String, String>,
    /// When the run was created
    pub created_at: DateTime<Utc>,
    /// When the run last transitioned
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Create a fresh run for a session
    pub fn new(
        definition_name: impl Into<String>,
        session_id: impl Into<String>,
        context_variables: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: Uuid::new_v4(),
            definition_name: definition_name.into(),
            session_id: session_id.into(),
            current_step_index: 0,
            status: WorkflowStatus::Idle,
            context_variables,
            created_at: now,
            updated_at: now,
        }
    }

    /// Serializable subset sufficient to resume the run later
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.workflow_id,
            definition_name: self.definition_name.clone(),
            current_step_index: self.current_step_index,
            status: self.status,
            context_variables: self.context_variables.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Persisted snapshot of a run, stored and loaded through the session store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowSnapshot {
    /// Unique identifier of the run
    pub workflow_id: Uuid,
    /// Name of the workflow definition
    pub definition_name: String,
    /// Step index the run was saved at
    pub current_step_index: usize,
    /// Status the run was saved in
    pub status: WorkflowStatus,
    /// Context variables at save time
    pub context_variables: HashMap<String, String>,
    /// When the run was created
    pub created_at: DateTime<Utc>,
    /// When the run last transitioned before saving
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    /// Rehydrate a live state for the given session
    pub fn restore(&self, session_id: impl Into<String>) -> WorkflowState {
        WorkflowState {
            workflow_id: self.workflow_id,
            definition_name: self.definition_name.clone(),
            session_id: session_id.into(),
            current_step_index: self.current_step_index,
            status: self.status,
            context_variables: self.context_variables.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Resolution state of an approval request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalResolution {
    /// Waiting for a decision
    Pending,
    /// Resolved with the chosen option string
    Resolved(String),
}

/// A pending decision point gating step advancement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique approval request identifier
    pub id: Uuid,
    /// Run this request belongs to
    pub workflow_id: Uuid,
    /// Step awaiting the decision
    pub step_id: String,
    /// Human-readable prompt shown to the decider
    pub message: String,
    /// Ordered, distinct option strings
    pub options: Vec<String>,
    /// Current resolution state
    pub resolution: ApprovalResolution,
    /// When the request was opened
    pub created_at: DateTime<Utc>,
    /// Inactivity deadline; None waits indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// Whether the given choice is one of the offered options
    pub fn offers(&self, choice: &str) -> bool {
        self.options.iter().any(|o| o == choice)
    }
}

/// Progress event emitted to subscribers on every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Name of the workflow definition
    pub workflow_name: String,
    /// Step index the event refers to (0-based)
    pub current_step_index: usize,
    /// Total number of steps in the definition
    pub total_steps: usize,
    /// Name of the step the event refers to
    pub current_step_name: String,
    /// Run status at emission time
    pub status: WorkflowStatus,
    /// Optional human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

/// Severity of a diagnostics log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One diagnostics log entry, appended per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Name of the step the entry belongs to
    pub step_name: String,
    /// Entry text
    pub message: String,
    /// Severity
    pub level: LogLevel,
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
}
