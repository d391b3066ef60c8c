//! Per-session workflow execution engine
//!
//! One engine task owns one run: it is the only writer of the session's
//! `WorkflowState`. Cancellation is cooperative, checked before a step is
//! marked started, when the external call returns, and before advancing;
//! an in-flight external call is never aborted, only its result discarded.

use crate::models::configuration::OrchestratorConfig;
use crate::models::workflow::{
    ApprovalRequest, ApprovalResolution, ApprovalTimeout, LogLevel, ProgressEvent, StepDefinition,
    WorkflowDefinition, WorkflowState, WorkflowStatus,
};
use crate::workflow::approval::{classify_choice, reject_choice, ApprovalDecision, ApprovalGate};
use crate::workflow::error::WorkflowError;
use crate::workflow::executor::StepExecutor;
use crate::workflow::persistence::SessionStore;
use crate::workflow::progress::{ProgressLog, SubscriberSet};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// Where the engine picks up when it starts or resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryPhase {
    /// Execute the current step (fresh start, or a Running snapshot whose
    /// in-flight step is re-issued rather than assumed complete)
    Execute,
    /// Re-open the approval gate for the current step (WaitingApproval
    /// snapshot; the step's work finished before the interruption)
    Gate,
}

/// Outcome of one approval gate
enum GateOutcome {
    Approved,
    Rejected { timed_out: bool },
    Modify,
    Cancelled,
}

/// The engine driving one session's run
pub(crate) struct SessionEngine {
    pub session_id: String,
    pub definition: Arc<WorkflowDefinition>,
    pub state: Arc<RwLock<WorkflowState>>,
    pub log: Arc<ProgressLog>,
    pub last_event: Arc<Mutex<Option<ProgressEvent>>>,
    pub executor: Arc<dyn StepExecutor>,
    pub store: Arc<dyn SessionStore>,
    pub gate: Arc<ApprovalGate>,
    pub subscribers: Arc<SubscriberSet>,
    pub cancelled: Arc<AtomicBool>,
    pub cancel_notify: Arc<Notify>,
    pub config: OrchestratorConfig,
}

impl SessionEngine {
    /// Drive the run to a terminal state
    pub(crate) async fn run(self, entry: EntryPhase) {
        let total = self.definition.total_steps();
        let mut phase = entry;

        loop {
            // Cancellation check before marking the step started
            if self.cancelled.load(Ordering::SeqCst) {
                self.finish_cancelled("Workflow cancelled").await;
                return;
            }

            let index = self.current_index();
            if index >= total {
                self.finish_completed().await;
                return;
            }
            let step = self.definition.steps[index].clone();

            if phase == EntryPhase::Execute {
                // Pre-check declared dependencies before any side effects
                if let Some(variable) = self.missing_variable(&step) {
                    let error = WorkflowError::MissingDependency {
                        step_id: step.id.clone(),
                        variable,
                    };
                    self.finish_failed(&step, &error.to_string()).await;
                    return;
                }

                self.log.mark_started();
                self.log.add(&step.name, "Step started", LogLevel::Info);
                self.set_status(WorkflowStatus::Running);
                self.save().await;
                self.emit(
                    WorkflowStatus::Running,
                    Some(format!("Step '{}' started", step.name)),
                )
                .await;

                tracing::info!(
                    session = %self.session_id,
                    workflow = %self.definition.name,
                    step = %step.id,
                    "executing step"
                );

                let result = self.executor.execute(&step.template_ref, &self.context()).await;

                // A cancellation recorded while the external call was
                // outstanding takes effect now; the result is discarded.
                if self.cancelled.load(Ordering::SeqCst) {
                    self.finish_cancelled("Workflow cancelled").await;
                    return;
                }

                match result {
                    Ok(patch) => {
                        self.merge_patch(patch);
                        self.save().await;
                    }
                    Err(error) => {
                        let error = WorkflowError::from(error);
                        self.finish_failed(&step, &error.to_string()).await;
                        return;
                    }
                }
            }

            if step.requires_approval {
                match self.await_approval(&step).await {
                    GateOutcome::Approved => {}
                    GateOutcome::Modify => {
                        // Re-run the gated step with the updated context
                        phase = EntryPhase::Execute;
                        continue;
                    }
                    GateOutcome::Rejected { timed_out } => {
                        let message = if timed_out {
                            "Approval timed out; workflow cancelled"
                        } else {
                            "Approval rejected; workflow cancelled"
                        };
                        self.finish_cancelled(message).await;
                        return;
                    }
                    GateOutcome::Cancelled => {
                        self.finish_cancelled("Workflow cancelled").await;
                        return;
                    }
                }
            }

            // Cancellation check before advancing
            if self.cancelled.load(Ordering::SeqCst) {
                self.finish_cancelled("Workflow cancelled").await;
                return;
            }

            self.advance_to(index + 1);
            if index + 1 >= total {
                self.finish_completed().await;
                return;
            }
            self.save().await;
            phase = EntryPhase::Execute;
        }
    }

    /// Suspend at the step's approval gate until resolved, expired, or
    /// cancelled
    async fn await_approval(&self, step: &StepDefinition) -> GateOutcome {
        let deadline = match step.approval_timeout {
            ApprovalTimeout::Default => self.config.default_approval_timeout(),
            ApprovalTimeout::Disabled => None,
            ApprovalTimeout::Seconds(secs) => Some(Duration::from_secs(u64::from(secs))),
        };
        let expires_at =
            deadline.map(|d| Utc::now() + chrono::Duration::seconds(d.as_secs() as i64));

        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            workflow_id: self.state.read().unwrap().workflow_id,
            step_id: step.id.clone(),
            message: step
                .approval_message
                .clone()
                .unwrap_or_else(|| format!("Approve step '{}' to continue", step.name)),
            options: step.approval_options.clone(),
            resolution: ApprovalResolution::Pending,
            created_at: Utc::now(),
            expires_at,
        };

        self.log.mark_started();
        self.log.add(&step.name, "Waiting for approval", LogLevel::Info);
        self.set_status(WorkflowStatus::WaitingApproval);
        self.save().await;

        let rx = self.gate.open(&self.session_id, request.clone());
        self.emit(WorkflowStatus::WaitingApproval, Some(request.message.clone()))
            .await;

        // Subscribers may resolve synchronously; deferred responses arrive
        // through submit_approval_response.
        if let Some(choice) = self.subscribers.request_approval(&request).await {
            if let Err(error) = self.gate.resolve(&self.session_id, request.id, &choice) {
                tracing::warn!(
                    session = %self.session_id,
                    error = %error,
                    "approval subscriber returned an unusable choice"
                );
            }
        }

        let expiry = async move {
            match deadline {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            choice = rx => match choice {
                Ok(choice) => {
                    self.log.add(
                        &step.name,
                        &format!("Approval resolved: {}", choice),
                        LogLevel::Info,
                    );
                    match classify_choice(&choice) {
                        ApprovalDecision::Approved => GateOutcome::Approved,
                        ApprovalDecision::Modify => GateOutcome::Modify,
                        ApprovalDecision::Rejected => GateOutcome::Rejected { timed_out: false },
                    }
                }
                // The gate was closed underneath the wait
                Err(_) => GateOutcome::Cancelled,
            },
            _ = self.cancel_notify.notified() => {
                self.gate.close(&self.session_id);
                GateOutcome::Cancelled
            }
            _ = expiry => {
                self.gate.close(&self.session_id);
                let auto_choice = reject_choice(&request.options);
                self.log.add(
                    &step.name,
                    &format!(
                        "Approval timed out after inactivity; auto-resolved as '{}'",
                        auto_choice
                    ),
                    LogLevel::Warning,
                );
                GateOutcome::Rejected { timed_out: true }
            }
        }
    }

    fn current_index(&self) -> usize {
        self.state.read().unwrap().current_step_index
    }

    fn context(&self) -> HashMap<String, String> {
        self.state.read().unwrap().context_variables.clone()
    }

    fn missing_variable(&self, step: &StepDefinition) -> Option<String> {
        let state = self.state.read().unwrap();
        step.required_variables
            .iter()
            .find(|v| !state.context_variables.contains_key(*v))
            .cloned()
    }

    fn set_status(&self, status: WorkflowStatus) {
        let mut state = self.state.write().unwrap();
        state.status = status;
        state.updated_at = Utc::now();
    }

    fn advance_to(&self, index: usize) {
        let mut state = self.state.write().unwrap();
        state.current_step_index = index;
        state.updated_at = Utc::now();
    }

    fn merge_patch(&self, patch: HashMap<String, String>) {
        if patch.is_empty() {
            return;
        }
        let mut state = self.state.write().unwrap();
        for (key, value) in patch {
            state.context_variables.insert(key, value);
        }
        state.updated_at = Utc::now();
        if state.context_variables.len() > self.config.max_context_variables {
            tracing::warn!(
                session = %self.session_id,
                count = state.context_variables.len(),
                "context variable count exceeds configured maximum"
            );
        }
    }

    /// Persist the current snapshot; store failures are logged, not fatal
    async fn save(&self) {
        let snapshot = self.state.read().unwrap().snapshot();
        if let Err(error) = self.store.save(&self.session_id, &snapshot).await {
            tracing::warn!(
                session = %self.session_id,
                error = %error,
                "failed to persist workflow snapshot"
            );
        }
    }

    /// Emit one progress event derived from the current state
    async fn emit(&self, status: WorkflowStatus, message: Option<String>) {
        let index = self.current_index();
        let total = self.definition.total_steps();
        let step_name = self
            .definition
            .step(index.min(total.saturating_sub(1)))
            .map(|s| s.name.clone())
            .unwrap_or_default();

        let event = ProgressEvent {
            workflow_name: self.definition.name.clone(),
            current_step_index: index,
            total_steps: total,
            current_step_name: step_name,
            status,
            message,
            timestamp: Utc::now(),
        };

        *self.last_event.lock().unwrap() = Some(event.clone());
        self.subscribers.emit(&event).await;
    }

    async fn finish_completed(&self) {
        self.set_status(WorkflowStatus::Completed);
        let step_name = self
            .definition
            .steps
            .last()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        self.log.add(&step_name, "Workflow completed", LogLevel::Info);
        self.log.mark_completed();
        self.save().await;
        self.emit(WorkflowStatus::Completed, Some("Workflow completed".to_string()))
            .await;
        tracing::info!(session = %self.session_id, workflow = %self.definition.name, "workflow completed");
    }

    async fn finish_cancelled(&self, message: &str) {
        let step_name = self.current_step_name();
        self.set_status(WorkflowStatus::Cancelled);
        self.log.add(&step_name, message, LogLevel::Info);
        self.log.mark_completed();
        self.save().await;
        self.emit(WorkflowStatus::Cancelled, Some(message.to_string()))
            .await;
        tracing::info!(session = %self.session_id, workflow = %self.definition.name, "workflow cancelled");
    }

    async fn finish_failed(&self, step: &StepDefinition, error: &str) {
        self.set_status(WorkflowStatus::Failed);
        self.log.add(&step.name, error, LogLevel::Error);
        self.log.mark_completed();
        self.save().await;
        self.emit(WorkflowStatus::Failed, Some(error.to_string())).await;
        tracing::error!(
            session = %self.session_id,
            workflow = %self.definition.name,
            step = %step.id,
            error = error,
            "workflow failed"
        );
    }

    fn current_step_name(&self) -> String {
        let index = self.current_index();
        self.definition
            .step(index.min(self.definition.total_steps().saturating_sub(1)))
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }
}
