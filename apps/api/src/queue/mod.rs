// Application queue: durable task records, atomic claims, background consumers.
// Intake only ever enqueues; consumers own every later status transition.

pub mod memory;
pub mod postgres;
pub mod store;
pub mod worker;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::application::{ApplicationTask, NewApplicationTask};
use crate::queue::store::{StoreError, TaskStore};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cheap, cloneable handle to the task store shared by intake and consumers.
#[derive(Clone)]
pub struct ApplicationQueue {
    store: Arc<dyn TaskStore>,
}

impl ApplicationQueue {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        self.store.clone()
    }

    /// Persists one task as `queued`. Never waits on processing.
    pub async fn enqueue_one(&self, task: NewApplicationTask) -> Result<Uuid, QueueError> {
        let task = self.store.insert(task).await?;
        info!("Queued application task {} -> {}", task.id, task.job_redirect_url);
        Ok(task.id)
    }

    /// Enqueues each task independently; results are in submission order.
    pub async fn enqueue_batch(
        &self,
        tasks: Vec<NewApplicationTask>,
    ) -> Vec<Result<Uuid, QueueError>> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let result = self.enqueue_one(task).await;
            if let Err(e) = &result {
                warn!("Enqueue failed for one batch member: {e}");
            }
            ids.push(result);
        }
        ids
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ApplicationTask>, QueueError> {
        Ok(self.store.get(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::memory::MemoryTaskStore;
    use crate::models::application::TaskStatus;
    use std::collections::BTreeMap;

    fn new_task(url: &str) -> NewApplicationTask {
        NewApplicationTask {
            job_id: None,
            job_redirect_url: url.to_string(),
            applicant_fields: BTreeMap::new(),
            resume_attachment: None,
            is_batch_member: true,
        }
    }

    #[tokio::test]
    async fn test_batch_ids_follow_submission_order() {
        let queue = ApplicationQueue::new(Arc::new(MemoryTaskStore::new()));
        let urls: Vec<String> = (0..5).map(|i| format!("https://jobs.example/{i}")).collect();

        let ids: Vec<Uuid> = queue
            .enqueue_batch(urls.iter().map(|u| new_task(u)).collect())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(ids.len(), 5);
        for (id, url) in ids.iter().zip(&urls) {
            let task = queue.get(*id).await.unwrap().unwrap();
            assert_eq!(&task.job_redirect_url, url);
            assert_eq!(task.status, TaskStatus::Queued);
        }
    }

    #[tokio::test]
    async fn test_invalid_batch_member_fails_alone() {
        let queue = ApplicationQueue::new(Arc::new(MemoryTaskStore::new()));

        let results = queue
            .enqueue_batch(vec![
                new_task("https://a.example"),
                new_task(""),
                new_task("https://c.example"),
            ])
            .await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
