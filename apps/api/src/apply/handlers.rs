//! Axum route handlers for the application pipeline.
//!
//! Intake only validates and enqueues. Processing happens later, in the
//! queue consumers.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{ApplicationTask, NewApplicationTask, ResumeAttachment};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ResumePayload {
    #[serde(alias = "fileName")]
    file_name: String,
    #[serde(alias = "contentBase64")]
    content_base64: String,
}

#[derive(Debug, Serialize)]
pub struct RejectedJob {
    pub index: usize,
    pub redirect_url: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MassApplyResponse {
    pub status: &'static str,
    pub task_ids: Vec<Uuid>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedJob>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/applications/mass-apply
///
/// Creates one queued task per job and returns their ids without waiting for
/// any of them to be processed. Validation is all-or-nothing; a storage
/// failure only rejects the affected job.
pub async fn handle_mass_apply(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<MassApplyResponse>, AppError> {
    let tasks = parse_mass_apply(&body)?;
    let urls: Vec<String> = tasks.iter().map(|t| t.job_redirect_url.clone()).collect();

    let mut task_ids = Vec::with_capacity(tasks.len());
    let mut rejected = Vec::new();
    let mut first_error = None;
    for (index, result) in state.queue.enqueue_batch(tasks).await.into_iter().enumerate() {
        match result {
            Ok(id) => task_ids.push(id),
            Err(e) => {
                rejected.push(RejectedJob {
                    index,
                    redirect_url: urls[index].clone(),
                    error: e.to_string(),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    if task_ids.is_empty() {
        if let Some(e) = first_error {
            return Err(e.into());
        }
    }

    info!(
        "Mass apply queued {} applications ({} rejected)",
        task_ids.len(),
        rejected.len()
    );
    Ok(Json(MassApplyResponse {
        status: "queued",
        message: format!("Queued {} applications", task_ids.len()),
        task_ids,
        rejected,
    }))
}

/// GET /api/v1/applications/:id
///
/// Current status and result of one task. Resume bytes are never returned.
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationTask>, AppError> {
    state
        .queue
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Application task {id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// Request validation
// ────────────────────────────────────────────────────────────────────────────

fn validation(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

/// Turns a mass-apply body into tasks, or rejects the whole request.
fn parse_mass_apply(body: &Value) -> Result<Vec<NewApplicationTask>, AppError> {
    let jobs = match body.get("jobs") {
        Some(Value::Array(jobs)) if !jobs.is_empty() => jobs,
        Some(Value::Array(_)) => return Err(validation("No jobs provided")),
        Some(Value::Null) | None => return Err(validation("jobs is required")),
        Some(_) => return Err(validation("jobs must be a list")),
    };

    let resume = parse_resume(body.get("resume").or_else(|| body.get("resumeData")))?;
    let shared_fields = parse_applicant(body.get("applicant"), "applicant")?;

    jobs.iter()
        .enumerate()
        .map(|(i, job)| {
            let job = job
                .as_object()
                .ok_or_else(|| validation(format!("jobs[{i}] must be an object")))?;
            let redirect_url = job
                .get("redirect_url")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    validation(format!("jobs[{i}].redirect_url must be a non-empty string"))
                })?;

            let mut applicant_fields = shared_fields.clone();
            applicant_fields.extend(parse_applicant(
                job.get("applicant"),
                &format!("jobs[{i}].applicant"),
            )?);

            Ok(NewApplicationTask {
                job_id: job_id(job),
                job_redirect_url: redirect_url.to_string(),
                applicant_fields,
                resume_attachment: Some(resume.clone()),
                is_batch_member: true,
            })
        })
        .collect()
}

fn parse_resume(value: Option<&Value>) -> Result<ResumeAttachment, AppError> {
    let value = value
        .filter(|v| !v.is_null())
        .ok_or_else(|| validation("resume is required"))?;
    let payload: ResumePayload = serde_json::from_value(value.clone())
        .map_err(|e| validation(format!("resume is malformed: {e}")))?;
    if payload.file_name.trim().is_empty() {
        return Err(validation("resume.file_name must not be empty"));
    }

    let attachment = ResumeAttachment::from_base64(payload.file_name, &payload.content_base64)
        .map_err(|e| validation(format!("resume.content_base64 is not valid base64: {e}")))?;
    if attachment.data.is_empty() {
        return Err(validation("resume is empty"));
    }
    Ok(attachment)
}

/// Applicant fields are a flat string map; nulls are dropped.
fn parse_applicant(value: Option<&Value>, path: &str) -> Result<BTreeMap<String, String>, AppError> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(fields)) => fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(key, v)| match v {
                Value::String(s) => Ok((key.clone(), s.clone())),
                _ => Err(validation(format!("{path}.{key} must be a string"))),
            })
            .collect(),
        Some(_) => Err(validation(format!("{path} must be an object"))),
    }
}

fn job_id(job: &Map<String, Value>) -> Option<String> {
    match job.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
