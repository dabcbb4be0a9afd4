//! Tracking for background ingestion runs.
//!
//! Every run is keyed by document id and moves through
//! `Pending → Running → Completed | Failed`. Callers can poll
//! [`TaskTracker::status`] or await [`TaskTracker::wait`].

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::ingest::IngestReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed { report: IngestReport },
    Failed { message: String },
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

/// Shared registry of task states. Clones share state.
#[derive(Clone, Default)]
pub struct TaskTracker {
    tasks: Arc<Mutex<HashMap<String, watch::Sender<TaskState>>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `id`'s state, registering the task if it is new.
    pub fn set(&self, id: &str, state: TaskState) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.get(id) {
            Some(sender) => {
                sender.send_replace(state);
            }
            None => {
                let (sender, _) = watch::channel(state);
                tasks.insert(id.to_string(), sender);
            }
        }
    }

    /// Register `id` as `Pending` unless it already has an unfinished
    /// run. Returns `false` if it does.
    pub fn try_begin(&self, id: &str) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        match tasks.get(id) {
            Some(sender) if !sender.borrow().is_finished() => false,
            Some(sender) => {
                sender.send_replace(TaskState::Pending);
                true
            }
            None => {
                let (sender, _) = watch::channel(TaskState::Pending);
                tasks.insert(id.to_string(), sender);
                true
            }
        }
    }

    /// Whether `id` has a run that is pending or running.
    pub fn is_active(&self, id: &str) -> bool {
        self.status(id).is_some_and(|state| !state.is_finished())
    }

    pub fn status(&self, id: &str) -> Option<TaskState> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.get(id).map(|sender| sender.borrow().clone())
    }

    /// Wait until `id` finishes. `None` if no such task was registered.
    pub async fn wait(&self, id: &str) -> Option<TaskState> {
        let mut receiver = {
            let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.get(id)?.subscribe()
        };
        let state = receiver.wait_for(TaskState::is_finished).await.ok()?;
        Some(state.clone())
    }

    pub fn forget(&self, id: &str) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}
