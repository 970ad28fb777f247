use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an application task.
///
/// `queued → active → succeeded | failed`. A task may also go `active → active`
/// when its lease expires and another consumer re-claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Active,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Active => "active",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(TaskStatus::Queued),
            "active" => Some(TaskStatus::Active),
            "succeeded" => Some(TaskStatus::Succeeded),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Active)
                | (TaskStatus::Active, TaskStatus::Active)
                | (TaskStatus::Active, TaskStatus::Succeeded)
                | (TaskStatus::Active, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resume file carried by a task and attached to file inputs.
///
/// Every task of a mass-apply batch holds the same attachment: `data` is
/// shared, and the Postgres store keeps one `resume_attachments` row per `id`.
#[derive(Clone, PartialEq, Eq)]
pub struct ResumeAttachment {
    pub id: Uuid,
    pub file_name: String,
    pub data: Bytes,
}

impl fmt::Debug for ResumeAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeAttachment")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ResumeAttachment {
    /// Decodes a base64 payload as sent by API clients.
    pub fn from_base64(file_name: impl Into<String>, content: &str) -> Result<Self, base64::DecodeError> {
        let data = BASE64.decode(content.trim())?;
        Ok(Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            data: Bytes::from(data),
        })
    }

    /// File extension including the dot, e.g. `.pdf`. Empty when the name has none.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default()
    }
}

/// Why a logical field did not receive a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No selector pattern resolved on the page.
    NotFound,
    /// The field exists but the task carries nothing to put in it.
    NoValue,
    /// The element was found but filling it errored.
    FillFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFill {
    pub field: String,
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSkip {
    pub field: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Result of a prepared (populated, not submitted) application form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillOutcome {
    pub landed_url: String,
    pub filled: Vec<FieldFill>,
    pub skipped: Vec<FieldSkip>,
    /// A submit control was resolved on the page. It is never clicked.
    pub submit_located: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Session,
    Navigate,
    Worker,
}

/// Structured cause recorded on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub stage: FailureStage,
    pub message: String,
}

/// Terminal result stored on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskResult {
    Ready(FillOutcome),
    Failed(FailureCause),
}

impl TaskResult {
    /// Status a task takes when this result is recorded.
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskResult::Ready(_) => TaskStatus::Succeeded,
            TaskResult::Failed(_) => TaskStatus::Failed,
        }
    }
}

/// Everything needed to create a task; the queue assigns id and status.
#[derive(Debug, Clone)]
pub struct NewApplicationTask {
    pub job_id: Option<String>,
    pub job_redirect_url: String,
    pub applicant_fields: BTreeMap<String, String>,
    pub resume_attachment: Option<ResumeAttachment>,
    pub is_batch_member: bool,
}

/// One queued unit of work: fill this job's application form.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationTask {
    pub id: Uuid,
    pub job_id: Option<String>,
    pub job_redirect_url: String,
    pub applicant_fields: BTreeMap<String, String>,
    #[serde(skip)]
    pub resume_attachment: Option<ResumeAttachment>,
    pub is_batch_member: bool,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub attempts: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationTask {
    /// Builds a freshly queued task from its intake payload.
    pub fn queued(id: Uuid, new: NewApplicationTask) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_id: new.job_id,
            job_redirect_url: new.job_redirect_url,
            applicant_fields: new.applicant_fields,
            resume_attachment: new.resume_attachment,
            is_batch_member: new.is_batch_member,
            status: TaskStatus::Queued,
            result: None,
            attempts: 0,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn applicant_value(&self, field: &str) -> Option<&str> {
        self.applicant_fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Row shape of `application_tasks`.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationTaskRow {
    pub id: Uuid,
    pub job_id: Option<String>,
    pub job_redirect_url: String,
    pub applicant_fields: Value,
    pub resume_id: Option<Uuid>,
    /// Joined in from `resume_attachments`.
    pub resume_file_name: Option<String>,
    pub resume_data: Option<Vec<u8>>,
    pub is_batch_member: bool,
    pub status: String,
    pub result: Option<Value>,
    pub attempts: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationTaskRow> for ApplicationTask {
    type Error = String;

    fn try_from(row: ApplicationTaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::parse(&row.status)
            .ok_or_else(|| format!("task {} has unknown status '{}'", row.id, row.status))?;
        let applicant_fields: BTreeMap<String, String> =
            serde_json::from_value(row.applicant_fields)
                .map_err(|e| format!("task {} applicant_fields: {e}", row.id))?;
        let result = row
            .result
            .map(serde_json::from_value::<TaskResult>)
            .transpose()
            .map_err(|e| format!("task {} result: {e}", row.id))?;
        let resume_attachment = match (row.resume_id, row.resume_file_name, row.resume_data) {
            (Some(id), Some(file_name), Some(data)) => Some(ResumeAttachment {
                id,
                file_name,
                data: Bytes::from(data),
            }),
            _ => None,
        };

        Ok(ApplicationTask {
            id: row.id,
            job_id: row.job_id,
            job_redirect_url: row.job_redirect_url,
            applicant_fields,
            resume_attachment,
            is_batch_member: row.is_batch_member,
            status,
            result,
            attempts: row.attempts,
            lease_expires_at: row.lease_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
