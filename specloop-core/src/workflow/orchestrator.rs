//! Workflow orchestration and lifecycle management
//!
//! `WorkflowOrchestrator` owns the per-session state table: exactly one
//! non-terminal run may exist per session, and every external mutation goes
//! through the documented entry points. Runs for different sessions are
//! independent engine tasks.

use crate::models::configuration::OrchestratorConfig;
use crate::models::workflow::{
    ApprovalRequest, LogEntry, LogLevel, ProgressEvent, WorkflowDefinition, WorkflowSnapshot,
    WorkflowState, WorkflowStatus, INPUT_VARIABLE,
};
use crate::workflow::approval::ApprovalGate;
use crate::workflow::engine::{EntryPhase, SessionEngine};
use crate::workflow::error::WorkflowError;
use crate::workflow::executor::StepExecutor;
use crate::workflow::persistence::SessionStore;
use crate::workflow::progress::{
    ApprovalSubscriber, ProgressLog, ProgressSubscriber, SubscriberSet,
};
use crate::workflow::registry::DefinitionRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Live bookkeeping for one session's run
struct SessionHandle {
    state: Arc<RwLock<WorkflowState>>,
    log: Arc<ProgressLog>,
    last_event: Arc<Mutex<Option<ProgressEvent>>>,
    cancelled: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn new(state: WorkflowState) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(RwLock::new(state)),
            log: Arc::new(ProgressLog::new()),
            last_event: Arc::new(Mutex::new(None)),
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
            task: Mutex::new(None),
        })
    }

    fn status(&self) -> WorkflowStatus {
        self.state.read().unwrap().status
    }
}

/// Workflow orchestrator managing one run per conversation session
pub struct WorkflowOrchestrator {
    /// Registered workflow definitions (read-only input)
    registry: Arc<DefinitionRegistry>,
    /// External step execution collaborator
    executor: Arc<dyn StepExecutor>,
    /// External snapshot storage
    store: Arc<dyn SessionStore>,
    /// Orchestrator configuration
    config: OrchestratorConfig,
    /// Per-session run table
    sessions: DashMap<String, Arc<SessionHandle>>,
    /// Pending approval gates
    gate: Arc<ApprovalGate>,
    /// Registered observers
    subscribers: Arc<SubscriberSet>,
}

impl WorkflowOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        registry: Arc<DefinitionRegistry>,
        executor: Arc<dyn StepExecutor>,
        store: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            store,
            config,
            sessions: DashMap::new(),
            gate: Arc::new(ApprovalGate::new()),
            subscribers: Arc::new(SubscriberSet::new()),
        }
    }

    /// Register a progress subscriber; all subscribers receive every event
    /// in emission order
    pub async fn on_progress(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.subscribers.add_progress(subscriber).await;
    }

    /// Register an approval subscriber
    pub async fn on_approval_required(&self, subscriber: Arc<dyn ApprovalSubscriber>) {
        self.subscribers.add_approval(subscriber).await;
    }

    /// Start a workflow for a session
    ///
    /// Fails with `AlreadyRunning` when the session has a non-terminal run,
    /// `UnknownWorkflow` when the definition is not registered. On success
    /// the run is Running at step 0 and advances asynchronously.
    pub async fn start_workflow(
        &self,
        definition_name: &str,
        initial_input: &str,
        mut context_variables: HashMap<String, String>,
        session_id: &str,
    ) -> Result<WorkflowState, WorkflowError> {
        let definition =
            self.registry
                .get(definition_name)
                .ok_or_else(|| WorkflowError::UnknownWorkflow {
                    name: definition_name.to_string(),
                })?;

        if !initial_input.is_empty() {
            context_variables.insert(INPUT_VARIABLE.to_string(), initial_input.to_string());
        }

        let mut state = WorkflowState::new(definition_name, session_id, context_variables);
        state.status = WorkflowStatus::Running;
        let started = state.clone();

        let handle = SessionHandle::new(state);
        self.install_handle(session_id, handle.clone())?;
        self.spawn_engine(session_id, definition, handle, EntryPhase::Execute);

        tracing::info!(
            session = session_id,
            workflow = definition_name,
            "workflow started"
        );
        Ok(started)
    }

    /// Resume a run from a persisted snapshot
    ///
    /// A Running snapshot re-issues the step that was in flight; a
    /// WaitingApproval snapshot re-opens the gate for the saved step; a
    /// terminal snapshot is rehydrated without spawning an engine.
    pub async fn resume_workflow(
        &self,
        session_id: &str,
        snapshot: WorkflowSnapshot,
    ) -> Result<WorkflowState, WorkflowError> {
        let definition = self.registry.get(&snapshot.definition_name).ok_or_else(|| {
            WorkflowError::StateMismatch {
                reason: format!(
                    "definition `{}` is no longer registered",
                    snapshot.definition_name
                ),
            }
        })?;

        let total = definition.total_steps();
        let index_in_range = if snapshot.status.is_terminal() {
            snapshot.current_step_index <= total
        } else {
            snapshot.current_step_index < total
        };
        if !index_in_range {
            return Err(WorkflowError::StateMismatch {
                reason: format!(
                    "definition `{}` has {} steps but the snapshot was at step {}",
                    snapshot.definition_name, total, snapshot.current_step_index
                ),
            });
        }

        let state = snapshot.restore(session_id);
        let resumed = state.clone();
        let entry = match state.status {
            WorkflowStatus::WaitingApproval => EntryPhase::Gate,
            _ => EntryPhase::Execute,
        };
        let terminal = state.status.is_terminal();

        let handle = SessionHandle::new(state);
        self.install_handle(session_id, handle.clone())?;

        if !terminal {
            self.spawn_engine(session_id, definition, handle, entry);
        }

        tracing::info!(
            session = session_id,
            workflow = %resumed.definition_name,
            step = resumed.current_step_index,
            "workflow resumed"
        );
        Ok(resumed)
    }

    /// Request cancellation of a session's run
    ///
    /// Cooperative: the engine performs the Cancelled transition and emits
    /// the single terminal event at its next cancellation check. No-op on
    /// terminal or unknown sessions.
    pub fn cancel_workflow(&self, session_id: &str) {
        if let Some(handle) = self.sessions.get(session_id) {
            if handle.status().is_terminal() {
                return;
            }
            handle.cancelled.store(true, Ordering::SeqCst);
            handle.cancel_notify.notify_one();
            tracing::info!(session = session_id, "workflow cancellation requested");
        }
    }

    /// Whether the session has a run in Running or WaitingApproval
    pub fn is_workflow_running(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|handle| handle.status().is_active())
            .unwrap_or(false)
    }

    /// Current state of the session's run, if any
    pub fn get_workflow_state(&self, session_id: &str) -> Option<WorkflowState> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.state.read().unwrap().clone())
    }

    /// Resolve a pending approval out-of-band, returning the resolved
    /// request
    ///
    /// Validates that the request is pending and the choice is one of its
    /// options; unknown choices are rejected without mutating state.
    pub async fn submit_approval_response(
        &self,
        session_id: &str,
        request_id: Uuid,
        choice: &str,
    ) -> Result<ApprovalRequest, WorkflowError> {
        self.gate.resolve(session_id, request_id, choice)
    }

    /// The approval request currently pending for a session, if any
    pub fn pending_approval(&self, session_id: &str) -> Option<ApprovalRequest> {
        self.gate.pending_request(session_id)
    }

    /// Diagnostics log entries for the session's current run
    pub fn get_logs(&self, session_id: &str) -> Vec<LogEntry> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.log.entries())
            .unwrap_or_default()
    }

    /// Diagnostics log entries at one level
    pub fn get_logs_by_level(&self, session_id: &str, level: LogLevel) -> Vec<LogEntry> {
        self.sessions
            .get(session_id)
            .map(|handle| handle.log.entries_by_level(level))
            .unwrap_or_default()
    }

    /// Elapsed time from the run's first step start to now, or to its
    /// completion once terminal
    pub fn total_elapsed_time(&self, session_id: &str) -> Option<Duration> {
        self.sessions
            .get(session_id)
            .and_then(|handle| handle.log.total_elapsed())
    }

    /// Most recent progress event for the session's run
    pub fn last_progress_event(&self, session_id: &str) -> Option<ProgressEvent> {
        self.sessions
            .get(session_id)
            .and_then(|handle| handle.last_event.lock().unwrap().clone())
    }

    /// Await the engine task and return the terminal status
    pub async fn wait_for_completion(&self, session_id: &str) -> Option<WorkflowStatus> {
        let task = self
            .sessions
            .get(session_id)
            .and_then(|handle| handle.task.lock().unwrap().take());

        if let Some(task) = task {
            if let Err(error) = task.await {
                tracing::error!(session = session_id, error = %error, "engine task failed");
            }
        }

        self.get_workflow_state(session_id).map(|s| s.status)
    }

    /// Names of all registered workflow definitions
    pub fn list_workflows(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Look up a registered workflow definition
    pub fn get_workflow_definition(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.registry.get(name)
    }

    /// Install a handle for the session, enforcing one non-terminal run
    /// per session
    fn install_handle(
        &self,
        session_id: &str,
        handle: Arc<SessionHandle>,
    ) -> Result<(), WorkflowError> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().status().is_terminal() {
                    return Err(WorkflowError::AlreadyRunning {
                        session_id: session_id.to_string(),
                    });
                }
                occupied.insert(handle);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle);
            }
        }
        Ok(())
    }

    /// Spawn the engine task for a session's run
    fn spawn_engine(
        &self,
        session_id: &str,
        definition: Arc<WorkflowDefinition>,
        handle: Arc<SessionHandle>,
        entry: EntryPhase,
    ) {
        let engine = SessionEngine {
            session_id: session_id.to_string(),
            definition,
            state: handle.state.clone(),
            log: handle.log.clone(),
            last_event: handle.last_event.clone(),
            executor: self.executor.clone(),
            store: self.store.clone(),
            gate: self.gate.clone(),
            subscribers: self.subscribers.clone(),
            cancelled: handle.cancelled.clone(),
            cancel_notify: handle.cancel_notify.clone(),
            config: self.config.clone(),
        };

        let task = tokio::spawn(async move {
            engine.run(entry).await;
        });

        *handle.task.lock().unwrap() = Some(task);
    }
}
