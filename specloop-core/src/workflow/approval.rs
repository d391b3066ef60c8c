//! Approval gate management
//!
//! A gate is fully described by its `ApprovalRequest`. Options are plain
//! strings; the decision they carry is a naming convention, not a type
//! (approve-like advances, modify-like re-runs the step, anything else
//! rejects).

use crate::models::workflow::{ApprovalRequest, ApprovalResolution};
use crate::workflow::error::WorkflowError;
use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Decision carried by a chosen option string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Advance to the next step
    Approved,
    /// Cancel the workflow
    Rejected,
    /// Re-run the gated step with updated context
    Modify,
}

/// Classify an option string by the naming convention
pub fn classify_choice(choice: &str) -> ApprovalDecision {
    match choice.to_ascii_lowercase().as_str() {
        "approve" | "approved" | "yes" | "proceed" | "continue" => ApprovalDecision::Approved,
        "modify" | "revise" | "rework" => ApprovalDecision::Modify,
        _ => ApprovalDecision::Rejected,
    }
}

/// The option conventionally meaning "reject" among the offered ones
pub fn reject_choice(options: &[String]) -> String {
    options
        .iter()
        .find(|o| classify_choice(o) == ApprovalDecision::Rejected)
        .cloned()
        .unwrap_or_else(|| "reject".to_string())
}

/// Pending approval request plus the channel back to the waiting engine
struct PendingApproval {
    request: ApprovalRequest,
    responder: oneshot::Sender<String>,
}

/// Tracks the pending approval request of each session
///
/// At most one request is pending per session: a session runs one workflow,
/// and a workflow suspends at one gate at a time.
pub struct ApprovalGate {
    pending: DashMap<String, PendingApproval>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Open a gate for a session and return the resolution channel
    pub fn open(&self, session_id: &str, request: ApprovalRequest) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            session_id.to_string(),
            PendingApproval {
                request,
                responder: tx,
            },
        );
        rx
    }

    /// Resolve a pending gate with one of its offered options, returning
    /// the resolved request
    ///
    /// Unknown choices are rejected without consuming the gate; the request
    /// stays pending and a later valid submission still resolves it.
    pub fn resolve(
        &self,
        session_id: &str,
        request_id: Uuid,
        choice: &str,
    ) -> Result<ApprovalRequest, WorkflowError> {
        {
            let entry =
                self.pending
                    .get(session_id)
                    .ok_or_else(|| WorkflowError::NoPendingApproval {
                        session_id: session_id.to_string(),
                        request_id: request_id.to_string(),
                    })?;

            if entry.request.id != request_id {
                return Err(WorkflowError::NoPendingApproval {
                    session_id: session_id.to_string(),
                    request_id: request_id.to_string(),
                });
            }

            if !entry.request.offers(choice) {
                return Err(WorkflowError::UnknownApprovalOption {
                    choice: choice.to_string(),
                });
            }
        }

        let (_, pending) = self
            .pending
            .remove(session_id)
            .ok_or_else(|| WorkflowError::NoPendingApproval {
                session_id: session_id.to_string(),
                request_id: request_id.to_string(),
            })?;

        let mut resolved = pending.request;
        resolved.resolution = ApprovalResolution::Resolved(choice.to_string());
        let _ = pending.responder.send(choice.to_string());
        tracing::info!(
            session = session_id,
            request = %request_id,
            choice = choice,
            "approval resolved"
        );

        Ok(resolved)
    }

    /// The request currently pending for a session, if any
    pub fn pending_request(&self, session_id: &str) -> Option<ApprovalRequest> {
        self.pending
            .get(session_id)
            .map(|entry| entry.request.clone())
    }

    /// Drop a session's pending gate (timeout or cancellation)
    pub fn close(&self, session_id: &str) {
        self.pending.remove(session_id);
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}
