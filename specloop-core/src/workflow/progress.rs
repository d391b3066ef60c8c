//! Progress and diagnostics bookkeeping
//!
//! `ProgressLog` accumulates leveled, timestamped entries per run.
//! `SubscriberSet` fans events out to registered observers; subscribers are
//! awaited one at a time so every subscriber sees every event in emission
//! order.

use crate::models::workflow::{ApprovalRequest, LogEntry, LogLevel, ProgressEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// Receives progress events; must return promptly
#[async_trait]
pub trait ProgressSubscriber: Send + Sync {
    async fn on_progress(&self, event: &ProgressEvent);
}

/// Receives approval requests
///
/// Return `Some(choice)` to resolve the gate immediately, or `None` to
/// defer to `submit_approval_response`.
#[async_trait]
pub trait ApprovalSubscriber: Send + Sync {
    async fn on_approval_required(&self, request: &ApprovalRequest) -> Option<String>;
}

#[derive(Default)]
struct LogInner {
    entries: Vec<LogEntry>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// Append-only diagnostics log for one workflow run
pub struct ProgressLog {
    inner: Mutex<LogInner>,
}

impl ProgressLog {
    /// Create an empty log; each run owns a fresh one
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
        }
    }

    /// Append an entry
    pub fn add(&self, step_name: &str, message: &str, level: LogLevel) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.push(LogEntry {
            step_name: step_name.to_string(),
            message: message.to_string(),
            level,
            timestamp: Utc::now(),
        });
    }

    /// All entries in append order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Entries at the given level, in append order
    pub fn entries_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Record the first step-start timestamp; later calls are ignored
    pub fn mark_started(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.started_at.is_none() {
            inner.started_at = Some(Utc::now());
        }
    }

    /// Record the completion timestamp; later calls are ignored
    pub fn mark_completed(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.completed_at.is_none() {
            inner.completed_at = Some(Utc::now());
        }
    }

    /// Elapsed time from the first step start to completion, or to now for
    /// a run still in flight; None before the first step starts
    pub fn total_elapsed(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        let started = inner.started_at?;
        let end = inner.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).to_std().unwrap_or_default())
    }
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered progress and approval observers
pub struct SubscriberSet {
    progress: RwLock<Vec<Arc<dyn ProgressSubscriber>>>,
    approval: RwLock<Vec<Arc<dyn ApprovalSubscriber>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self {
            progress: RwLock::new(Vec::new()),
            approval: RwLock::new(Vec::new()),
        }
    }

    /// Register a progress subscriber
    pub async fn add_progress(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.progress.write().await.push(subscriber);
    }

    /// Register an approval subscriber
    pub async fn add_approval(&self, subscriber: Arc<dyn ApprovalSubscriber>) {
        self.approval.write().await.push(subscriber);
    }

    /// Deliver an event to every progress subscriber, in registration order
    pub async fn emit(&self, event: &ProgressEvent) {
        let subscribers = self.progress.read().await.clone();
        for subscriber in subscribers {
            subscriber.on_progress(event).await;
        }
    }

    /// Offer an approval request to subscribers; the first synchronous
    /// choice wins, None when every subscriber defers
    pub async fn request_approval(&self, request: &ApprovalRequest) -> Option<String> {
        let subscribers = self.approval.read().await.clone();
        for subscriber in subscribers {
            if let Some(choice) = subscriber.on_approval_required(request).await {
                return Some(choice);
            }
        }
        None
    }
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}
