//! Axum route handlers for resume analysis.

use std::collections::BTreeMap;

use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::jobs::aggregate::group_by_country;
use crate::jobs::handlers::resolve_category;
use crate::matching::analysis::{analyze_resume, search_keywords};
use crate::matching::extract::{extract_resume_text, ExtractError};
use crate::models::job::JobListing;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AnalyzeForm {
    resume: Option<Bytes>,
    job_category: Option<String>,
    include_remote: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub category: String,
    pub ats_score: u32,
    pub suggestions: Vec<String>,
    pub keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub total_jobs: usize,
    pub jobs_by_country: BTreeMap<String, Vec<JobListing>>,
    pub jobs: Vec<JobListing>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/resumes/analyze
///
/// Multipart fields: `resume` (PDF), `jobCategory`, `includeRemote`.
/// Scores the resume for the category and looks up matching jobs. A job
/// search failure yields an empty job list, not an error.
pub async fn handle_analyze_resume(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let form = read_form(multipart).await?;
    let pdf = form
        .resume
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;
    let category = resolve_category(form.job_category.as_deref())?;

    let text = extract_resume_text(pdf).await.map_err(|e| match e {
        ExtractError::Join(e) => AppError::Internal(anyhow::anyhow!("PDF extraction failed: {e}")),
        other => AppError::UnprocessableEntity(other.to_string()),
    })?;

    let analysis = analyze_resume(&text, category);
    let keywords = search_keywords(&analysis, category);

    let jobs = match state.jobs.search(category, &keywords, form.include_remote).await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!("Job search failed during resume analysis: {e}");
            Vec::new()
        }
    };
    info!(
        "Resume scored {} for {}; {} jobs found",
        analysis.score,
        category.name,
        jobs.len()
    );

    Ok(Json(AnalyzeResponse {
        category: category.name.to_string(),
        ats_score: analysis.score,
        suggestions: analysis.suggestions,
        keywords: analysis.matching_keywords,
        missing_keywords: analysis.missing_keywords,
        total_jobs: jobs.len(),
        jobs_by_country: group_by_country(&jobs),
        jobs,
    }))
}

async fn read_form(mut multipart: Multipart) -> Result<AnalyzeForm, AppError> {
    let mut form = AnalyzeForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                form.resume = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read resume upload: {e}"))
                })?);
            }
            "jobCategory" | "includeRemote" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid field '{name}': {e}")))?;
                if name == "jobCategory" {
                    form.job_category = Some(value);
                } else {
                    form.include_remote = value.trim() == "true";
                }
            }
            _ => {}
        }
    }
    Ok(form)
}
