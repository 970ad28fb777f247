//! Non-durable task store for local runs (`QUEUE_BACKEND=memory`) and tests.
//!
//! Finished tasks are kept for status lookups up to a retention limit; past
//! it the oldest terminal task is dropped and its id reads as unknown.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::application::{ApplicationTask, NewApplicationTask, TaskResult, TaskStatus};
use crate::queue::store::{validate_new_task, Completion, StoreError, TaskStore};

/// Terminal tasks kept by `MemoryTaskStore::new`.
pub const DEFAULT_TERMINAL_RETENTION: usize = 10_000;

struct Entry {
    task: ApplicationTask,
    lease_deadline: Option<Instant>,
}

impl Entry {
    fn claimable(&self, now: Instant) -> bool {
        match self.task.status {
            TaskStatus::Queued => true,
            TaskStatus::Active => self.lease_deadline.is_some_and(|deadline| deadline <= now),
            TaskStatus::Succeeded | TaskStatus::Failed => false,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.task.status, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// True while `attempt` is the delivery holding the claim.
    fn held_by(&self, attempt: i32) -> bool {
        self.task.status == TaskStatus::Active && self.task.attempts == attempt
    }

    fn lease_for(&mut self, lease: Duration, now: Instant) {
        let wall_clock = Utc::now();
        self.task.updated_at = wall_clock;
        self.task.lease_expires_at = chrono::Duration::from_std(lease)
            .ok()
            .map(|lease| wall_clock + lease);
        self.lease_deadline = Some(now + lease);
    }
}

/// Tasks kept in insertion order behind one lock.
pub struct MemoryTaskStore {
    entries: Mutex<Vec<Entry>>,
    terminal_retention: usize,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_TERMINAL_RETENTION)
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `terminal_retention` finished tasks. Queued and active
    /// tasks are never dropped.
    pub fn with_retention(terminal_retention: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            terminal_retention,
        }
    }
}

fn prune_terminal(entries: &mut Vec<Entry>, keep: usize) {
    let mut excess = entries
        .iter()
        .filter(|e| e.is_terminal())
        .count()
        .saturating_sub(keep);
    entries.retain(|e| {
        if excess > 0 && e.is_terminal() {
            excess -= 1;
            return false;
        }
        true
    });
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: NewApplicationTask) -> Result<ApplicationTask, StoreError> {
        validate_new_task(&task)?;
        let task = ApplicationTask::queued(Uuid::new_v4(), task);
        self.entries.lock().await.push(Entry {
            task: task.clone(),
            lease_deadline: None,
        });
        Ok(task)
    }

    async fn claim_next(&self, lease: Duration) -> Result<Option<ApplicationTask>, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let Some(entry) = entries.iter_mut().find(|e| e.claimable(now)) else {
            return Ok(None);
        };

        entry.task.status = TaskStatus::Active;
        entry.task.attempts += 1;
        entry.lease_for(lease, now);
        Ok(Some(entry.task.clone()))
    }

    async fn renew(&self, id: Uuid, attempt: i32, lease: Duration) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|e| e.task.id == id) {
            Some(entry) if entry.held_by(attempt) => {
                entry.lease_for(lease, Instant::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        attempt: i32,
        result: &TaskResult,
    ) -> Result<Completion, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.iter_mut().find(|e| e.task.id == id) else {
            return Ok(Completion::Ignored);
        };
        if !entry.held_by(attempt) || !entry.task.status.can_transition_to(result.status()) {
            return Ok(Completion::Ignored);
        }

        entry.task.status = result.status();
        entry.task.result = Some(result.clone());
        entry.task.lease_expires_at = None;
        entry.task.updated_at = Utc::now();
        entry.lease_deadline = None;
        prune_terminal(&mut entries, self.terminal_retention);
        Ok(Completion::Recorded)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ApplicationTask>, StoreError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .find(|e| e.task.id == id)
            .map(|e| e.task.clone()))
    }
}
