use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::application::{ApplicationTask, NewApplicationTask, TaskResult};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt task record: {0}")]
    Corrupt(String),

    #[error("Invalid task: {0}")]
    Invalid(String),
}

/// Whether a completion was recorded or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Recorded,
    /// The task is terminal or was re-claimed by a later delivery.
    Ignored,
}

/// Persistent home of application tasks.
///
/// All status transitions happen here and each one is atomic: two consumers
/// can never both move the same task from `queued` to `active`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: NewApplicationTask) -> Result<ApplicationTask, StoreError>;

    /// Claims the oldest `queued` task, or an `active` one whose lease has
    /// expired, marking it `active` with a fresh lease.
    async fn claim_next(&self, lease: Duration) -> Result<Option<ApplicationTask>, StoreError>;

    /// Extends the lease of delivery `attempt` by `lease` from now. False once
    /// the task is terminal or another delivery has claimed it.
    async fn renew(&self, id: Uuid, attempt: i32, lease: Duration) -> Result<bool, StoreError>;

    /// Records a terminal result for delivery `attempt`. Only the delivery
    /// that currently holds the claim can complete a task.
    async fn complete(
        &self,
        id: Uuid,
        attempt: i32,
        result: &TaskResult,
    ) -> Result<Completion, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ApplicationTask>, StoreError>;
}

pub(crate) fn validate_new_task(task: &NewApplicationTask) -> Result<(), StoreError> {
    if task.job_redirect_url.trim().is_empty() {
        return Err(StoreError::Invalid("job_redirect_url is empty".to_string()));
    }
    Ok(())
}
