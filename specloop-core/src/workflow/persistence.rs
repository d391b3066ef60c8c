//! Persistence contract with the external session store
//!
//! The orchestrator performs no I/O of its own: it hands a snapshot to the
//! injected store after every state transition, so a resumed process loses
//! at most the one step that was in flight.

use crate::models::workflow::WorkflowSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// Externally-backed snapshot storage, keyed by session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the latest snapshot for a session
    async fn save(&self, session_id: &str, snapshot: &WorkflowSnapshot) -> Result<()>;

    /// Load the last saved snapshot for a session
    async fn load(&self, session_id: &str) -> Result<Option<WorkflowSnapshot>>;
}

/// In-memory session store for embedding callers and tests
pub struct MemorySessionStore {
    snapshots: DashMap<String, WorkflowSnapshot>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            snapshots: DashMap::new(),
        }
    }

    /// Number of sessions with a saved snapshot
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether any snapshot has been saved
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session_id: &str, snapshot: &WorkflowSnapshot) -> Result<()> {
        self.snapshots
            .insert(session_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<WorkflowSnapshot>> {
        Ok(self.snapshots.get(session_id).map(|entry| entry.clone()))
    }
}
