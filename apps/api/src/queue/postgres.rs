//! Durable task store on Postgres.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so concurrent consumers (in one process
//! or many) never pick the same row. Renewal and completion are fenced on the
//! `attempts` value of the delivery that holds the claim.
//!
//! Resume bytes live in `resume_attachments`, written once per upload and
//! joined back in when a task is read.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::application::{ApplicationTask, ApplicationTaskRow, NewApplicationTask, TaskResult};
use crate::queue::store::{validate_new_task, Completion, StoreError, TaskStore};

#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_task(row: ApplicationTaskRow) -> Result<ApplicationTask, StoreError> {
    ApplicationTask::try_from(row).map_err(StoreError::Corrupt)
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: NewApplicationTask) -> Result<ApplicationTask, StoreError> {
        validate_new_task(&task)?;
        let applicant_fields = serde_json::to_value(&task.applicant_fields)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        if let Some(attachment) = &task.resume_attachment {
            let stored: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM resume_attachments WHERE id = $1)",
            )
            .bind(attachment.id)
            .fetch_one(&mut *tx)
            .await?;
            if !stored {
                sqlx::query(
                    r#"
                    INSERT INTO resume_attachments (id, file_name, data)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(attachment.id)
                .bind(&attachment.file_name)
                .bind(attachment.data.as_ref())
                .execute(&mut *tx)
                .await?;
            }
        }

        let row = sqlx::query_as::<_, ApplicationTaskRow>(
            r#"
            INSERT INTO application_tasks
                (id, job_id, job_redirect_url, applicant_fields,
                 resume_id, is_batch_member, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'queued')
            RETURNING *, NULL::text AS resume_file_name, NULL::bytea AS resume_data
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&task.job_id)
        .bind(&task.job_redirect_url)
        .bind(applicant_fields)
        .bind(task.resume_attachment.as_ref().map(|a| a.id))
        .bind(task.is_batch_member)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        // the attachment is already in hand; no need to read the bytes back
        let mut stored = into_task(row)?;
        stored.resume_attachment = task.resume_attachment;
        Ok(stored)
    }

    async fn claim_next(&self, lease: Duration) -> Result<Option<ApplicationTask>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationTaskRow>(
            r#"
            WITH claimed AS (
                UPDATE application_tasks
                SET status = 'active',
                    attempts = attempts + 1,
                    lease_expires_at = now() + make_interval(secs => $1),
                    updated_at = now()
                WHERE id = (
                    SELECT id FROM application_tasks
                    WHERE status = 'queued'
                       OR (status = 'active' AND lease_expires_at < now())
                    ORDER BY seq
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
            )
            SELECT t.*, a.file_name AS resume_file_name, a.data AS resume_data
            FROM claimed t
            LEFT JOIN resume_attachments a ON a.id = t.resume_id
            "#,
        )
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        if row.attempts > 1 {
            info!("Redelivering task {} (attempt {})", row.id, row.attempts);
        }
        into_task(row).map(Some)
    }

    async fn renew(&self, id: Uuid, attempt: i32, lease: Duration) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE application_tasks
            SET lease_expires_at = now() + make_interval(secs => $3), updated_at = now()
            WHERE id = $1 AND attempts = $2 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn complete(
        &self,
        id: Uuid,
        attempt: i32,
        result: &TaskResult,
    ) -> Result<Completion, StoreError> {
        let payload =
            serde_json::to_value(result).map_err(|e| StoreError::Invalid(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE application_tasks
            SET status = $3, result = $4, lease_expires_at = NULL, updated_at = now()
            WHERE id = $1 AND attempts = $2 AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(attempt)
        .bind(result.status().as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if updated == 1 {
            Completion::Recorded
        } else {
            Completion::Ignored
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<ApplicationTask>, StoreError> {
        sqlx::query_as::<_, ApplicationTaskRow>(
            r#"
            SELECT t.*, a.file_name AS resume_file_name, a.data AS resume_data
            FROM application_tasks t
            LEFT JOIN resume_attachments a ON a.id = t.resume_id
            WHERE t.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(into_task)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::{FillOutcome, ResumeAttachment, TaskStatus};
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    const LEASE: Duration = Duration::from_secs(60);

    fn new_task(url: &str, resume: Option<ResumeAttachment>) -> NewApplicationTask {
        NewApplicationTask {
            job_id: None,
            job_redirect_url: url.to_string(),
            applicant_fields: BTreeMap::new(),
            resume_attachment: resume,
            is_batch_member: true,
        }
    }

    fn ready() -> TaskResult {
        TaskResult::Ready(FillOutcome {
            landed_url: "https://example.com/apply".to_string(),
            filled: vec![],
            skipped: vec![],
            submit_located: false,
        })
    }

    #[test]
    fn test_status_values_match_migration() {
        let migration = include_str!("../../migrations/20250101000000_application_tasks.sql");
        for status in [
            TaskStatus::Queued,
            TaskStatus::Active,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
        ] {
            assert!(
                migration.contains(&format!("'{}'", status.as_str())),
                "migration is missing status {status}"
            );
        }
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_concurrent_claims_are_exclusive(pool: PgPool) {
        let store = Arc::new(PgTaskStore::new(pool));
        for i in 0..30 {
            store
                .insert(new_task(&format!("https://jobs.example/{i}"), None))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(task) = store.claim_next(LEASE).await.unwrap() {
                    claimed.push(task.id);
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 30);
        assert_eq!(unique.len(), 30);
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_expired_lease_makes_task_reclaimable(pool: PgPool) {
        let store = PgTaskStore::new(pool);
        let task = store.insert(new_task("https://a.example", None)).await.unwrap();
        let short = Duration::from_millis(200);

        let first = store.claim_next(short).await.unwrap().unwrap();
        assert_eq!(first.id, task.id);
        assert!(store.claim_next(short).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;

        let second = store.claim_next(LEASE).await.unwrap().unwrap();
        assert_eq!(second.id, task.id);
        assert_eq!(second.attempts, 2);

        // the stale delivery is fenced out
        assert!(!store.renew(task.id, first.attempts, LEASE).await.unwrap());
        assert_eq!(
            store.complete(task.id, first.attempts, &ready()).await.unwrap(),
            Completion::Ignored
        );
        assert_eq!(
            store.complete(task.id, second.attempts, &ready()).await.unwrap(),
            Completion::Recorded
        );
        assert_eq!(
            store.complete(task.id, second.attempts, &ready()).await.unwrap(),
            Completion::Ignored
        );
        assert_eq!(
            store.get(task.id).await.unwrap().unwrap().status,
            TaskStatus::Succeeded
        );
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_renewed_lease_blocks_reclaim(pool: PgPool) {
        let store = PgTaskStore::new(pool);
        let task = store.insert(new_task("https://a.example", None)).await.unwrap();
        let short = Duration::from_millis(300);

        let claimed = store.claim_next(short).await.unwrap().unwrap();
        assert!(store.renew(task.id, claimed.attempts, LEASE).await.unwrap());
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(store.claim_next(short).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[ignore = "needs a Postgres server in DATABASE_URL"]
    async fn test_batch_shares_one_stored_resume(pool: PgPool) {
        let store = PgTaskStore::new(pool.clone());
        let resume = ResumeAttachment::from_base64("cv.pdf", "JVBERi0xLjQ=").unwrap();
        for i in 0..3 {
            store
                .insert(new_task(&format!("https://jobs.example/{i}"), Some(resume.clone())))
                .await
                .unwrap();
        }

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resume_attachments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, 1);

        let claimed = store.claim_next(LEASE).await.unwrap().unwrap();
        let attachment = claimed.resume_attachment.unwrap();
        assert_eq!(attachment.id, resume.id);
        assert_eq!(attachment.file_name, "cv.pdf");
        assert_eq!(&attachment.data[..], b"%PDF-1.4");
    }
}
