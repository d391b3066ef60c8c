//! Tests for snapshot persistence and resumption

use async_trait::async_trait;
use chrono::Utc;
use specloop_core::models::configuration::OrchestratorConfig;
use specloop_core::models::workflow::{
    ApprovalRequest, ContextPatch, StepDefinition, WorkflowDefinition, WorkflowSnapshot,
    WorkflowStatus,
};
use specloop_core::workflow::{
    ApprovalSubscriber, DefinitionRegistry, ExecutionError, MemorySessionStore, SessionStore,
    StepExecutor, WorkflowError, WorkflowOrchestrator,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Step executor recording template invocations, optionally slow
struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl RecordingExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepExecutor for RecordingExecutor {
    async fn execute(
        &self,
        template_ref: &str,
        _context: &HashMap<String, String>,
    ) -> Result<ContextPatch, ExecutionError> {
        self.calls.lock().unwrap().push(template_ref.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ContextPatch::new())
    }
}

/// Approval subscriber answering every request with "approve"
struct AutoApprover;

#[async_trait]
impl ApprovalSubscriber for AutoApprover {
    async fn on_approval_required(&self, _request: &ApprovalRequest) -> Option<String> {
        Some("approve".to_string())
    }
}

fn spec_registry() -> Arc<DefinitionRegistry> {
    let registry = Arc::new(DefinitionRegistry::new());
    registry
        .register(WorkflowDefinition {
            name: "spec".to_string(),
            description: None,
            steps: vec![
                StepDefinition::new("requirements", "Requirements", "templates/requirements"),
                StepDefinition::new("design", "Design", "templates/design").with_approval(),
                StepDefinition::new("tasks", "Tasks", "templates/tasks"),
            ],
        })
        .unwrap();
    registry
}

fn orchestrator_on(
    registry: Arc<DefinitionRegistry>,
    executor: Arc<RecordingExecutor>,
    store: Arc<MemorySessionStore>,
) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(registry, executor, store, OrchestratorConfig::default())
}

/// Poll until the session suspends at its approval gate
async fn pending_request(
    orchestrator: &WorkflowOrchestrator,
    session_id: &str,
) -> ApprovalRequest {
    for _ in 0..500 {
        if let Some(request) = orchestrator.pending_approval(session_id) {
            return request;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no approval request appeared for session {}", session_id);
}

/// A snapshot saved at an approval gate round-trips into an identical
/// state, and the resumed run re-opens the gate without re-running the step
#[tokio::test]
async fn test_round_trip_from_waiting_approval() {
    let registry = spec_registry();
    let store = Arc::new(MemorySessionStore::new());
    let first_executor = RecordingExecutor::new();
    let first = orchestrator_on(registry.clone(), first_executor.clone(), store.clone());

    first
        .start_workflow("spec", "user auth", HashMap::new(), "session-1")
        .await
        .unwrap();
    pending_request(&first, "session-1").await;

    let snapshot = store.load("session-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, WorkflowStatus::WaitingApproval);
    assert_eq!(snapshot.current_step_index, 1);

    // A fresh orchestrator (same definitions, same store) picks it back up
    let second_executor = RecordingExecutor::new();
    let second = orchestrator_on(registry, second_executor.clone(), store.clone());

    let resumed = second
        .resume_workflow("session-1", snapshot.clone())
        .await
        .unwrap();
    assert_eq!(resumed.workflow_id, snapshot.workflow_id);
    assert_eq!(resumed.current_step_index, snapshot.current_step_index);
    assert_eq!(resumed.status, snapshot.status);
    assert_eq!(resumed.context_variables, snapshot.context_variables);

    // The gate is re-opened for the saved step; the design work is not
    // re-executed, only the decision is outstanding
    let request = pending_request(&second, "session-1").await;
    assert_eq!(request.step_id, "design");

    second
        .submit_approval_response("session-1", request.id, "approve")
        .await
        .unwrap();
    let status = second.wait_for_completion("session-1").await;
    assert_eq!(status, Some(WorkflowStatus::Completed));
    assert_eq!(second_executor.calls(), vec!["templates/tasks"]);
}

/// A Running snapshot re-issues the step that was in flight
#[tokio::test]
async fn test_resume_running_reissues_step() {
    let registry = spec_registry();
    let store = Arc::new(MemorySessionStore::new());
    let executor = RecordingExecutor::new();
    let orchestrator = orchestrator_on(registry, executor.clone(), store);
    orchestrator.on_approval_required(Arc::new(AutoApprover)).await;

    let mut context = HashMap::new();
    context.insert("input".to_string(), "user auth".to_string());
    let now = Utc::now();
    let snapshot = WorkflowSnapshot {
        workflow_id: Uuid::new_v4(),
        definition_name: "spec".to_string(),
        current_step_index: 1,
        status: WorkflowStatus::Running,
        context_variables: context,
        created_at: now,
        updated_at: now,
    };

    let resumed = orchestrator
        .resume_workflow("session-1", snapshot)
        .await
        .unwrap();
    assert_eq!(resumed.current_step_index, 1);

    let status = orchestrator.wait_for_completion("session-1").await;
    assert_eq!(status, Some(WorkflowStatus::Completed));

    // The interrupted step ran again; the completed one did not
    assert_eq!(
        executor.calls(),
        vec!["templates/design", "templates/tasks"]
    );
}

/// Resuming against a definition that is gone is a structural error
#[tokio::test]
async fn test_resume_unknown_definition() {
    let orchestrator = orchestrator_on(
        spec_registry(),
        RecordingExecutor::new(),
        Arc::new(MemorySessionStore::new()),
    );

    let now = Utc::now();
    let snapshot = WorkflowSnapshot {
        workflow_id: Uuid::new_v4(),
        definition_name: "release".to_string(),
        current_step_index: 0,
        status: WorkflowStatus::Running,
        context_variables: HashMap::new(),
        created_at: now,
        updated_at: now,
    };

    let err = orchestrator
        .resume_workflow("session-1", snapshot)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::StateMismatch { .. }));
}

/// Resuming past the end of a shrunken definition is a structural error
#[tokio::test]
async fn test_resume_shrunken_definition() {
    let registry = Arc::new(DefinitionRegistry::new());
    registry
        .register(WorkflowDefinition {
            name: "spec".to_string(),
            description: None,
            steps: vec![StepDefinition::new(
                "requirements",
                "Requirements",
                "templates/requirements",
            )],
        })
        .unwrap();
    let orchestrator = orchestrator_on(
        registry,
        RecordingExecutor::new(),
        Arc::new(MemorySessionStore::new()),
    );

    let now = Utc::now();
    let snapshot = WorkflowSnapshot {
        workflow_id: Uuid::new_v4(),
        definition_name: "spec".to_string(),
        current_step_index: 2,
        status: WorkflowStatus::Running,
        context_variables: HashMap::new(),
        created_at: now,
        updated_at: now,
    };

    let err = orchestrator
        .resume_workflow("session-1", snapshot)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::StateMismatch { .. }));
}

/// A session with a live run rejects resumption
#[tokio::test]
async fn test_resume_while_active() {
    let orchestrator = orchestrator_on(
        spec_registry(),
        RecordingExecutor::slow(Duration::from_secs(3600)),
        Arc::new(MemorySessionStore::new()),
    );

    orchestrator
        .start_workflow("spec", "user auth", HashMap::new(), "session-1")
        .await
        .unwrap();

    let now = Utc::now();
    let snapshot = WorkflowSnapshot {
        workflow_id: Uuid::new_v4(),
        definition_name: "spec".to_string(),
        current_step_index: 0,
        status: WorkflowStatus::Running,
        context_variables: HashMap::new(),
        created_at: now,
        updated_at: now,
    };

    let err = orchestrator
        .resume_workflow("session-1", snapshot)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyRunning { .. }));
}

/// A terminal snapshot rehydrates without spawning a run
#[tokio::test]
async fn test_resume_terminal_snapshot() {
    let executor = RecordingExecutor::new();
    let orchestrator = orchestrator_on(
        spec_registry(),
        executor.clone(),
        Arc::new(MemorySessionStore::new()),
    );

    let now = Utc::now();
    let snapshot = WorkflowSnapshot {
        workflow_id: Uuid::new_v4(),
        definition_name: "spec".to_string(),
        current_step_index: 3,
        status: WorkflowStatus::Completed,
        context_variables: HashMap::new(),
        created_at: now,
        updated_at: now,
    };

    let resumed = orchestrator
        .resume_workflow("session-1", snapshot)
        .await
        .unwrap();
    assert_eq!(resumed.status, WorkflowStatus::Completed);
    assert!(!orchestrator.is_workflow_running("session-1"));
    assert!(executor.calls().is_empty());

    // The archived run does not block a fresh start
    orchestrator.on_approval_required(Arc::new(AutoApprover)).await;
    orchestrator
        .start_workflow("spec", "second run", HashMap::new(), "session-1")
        .await
        .unwrap();
    let status = orchestrator.wait_for_completion("session-1").await;
    assert_eq!(status, Some(WorkflowStatus::Completed));
}
