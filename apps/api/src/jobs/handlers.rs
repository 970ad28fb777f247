//! Axum route handlers for job search.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::jobs::adzuna::AdzunaQuery;
use crate::matching::categories::{category_names, find_category, JobCategory, DEFAULT_CATEGORY};
use crate::models::job::JobListing;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct JobSearchParams {
    pub category: Option<String>,
    pub remote: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobSearchResponse {
    pub category: String,
    pub job_count: usize,
    pub jobs: Vec<JobListing>,
}

pub(crate) fn resolve_category(name: Option<&str>) -> Result<&'static JobCategory, AppError> {
    let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(DEFAULT_CATEGORY);
    find_category(name).ok_or_else(|| {
        AppError::Validation(format!(
            "Invalid category '{name}'. Available: {}",
            category_names()
        ))
    })
}

fn is_true(flag: Option<&str>) -> bool {
    flag.is_some_and(|f| f.trim().eq_ignore_ascii_case("true"))
}

/// GET /api/v1/jobs/search?category=
///
/// Searches JSearch with the category's own keywords, remote included.
pub async fn handle_search_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobSearchParams>,
) -> Result<Json<JobSearchResponse>, AppError> {
    let category = resolve_category(params.category.as_deref())?;
    let keywords: Vec<String> = category.keywords.iter().map(|k| k.to_string()).collect();

    let jobs = state.jobs.search(category, &keywords, true).await?;

    Ok(Json(JobSearchResponse {
        category: category.name.to_string(),
        job_count: jobs.len(),
        jobs,
    }))
}

/// GET /api/v1/jobs/adzuna?category=&remote=
///
/// Known category names map to their Adzuna category; anything else is sent
/// as free-text keywords.
pub async fn handle_adzuna_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobSearchParams>,
) -> Result<Json<Vec<JobListing>>, AppError> {
    let raw = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("category is required".to_string()))?;

    let query = match find_category(raw) {
        Some(category) => AdzunaQuery::Category(category.adzuna_category),
        None => AdzunaQuery::Keywords(raw),
    };
    let jobs = state
        .jobs
        .adzuna(query, is_true(params.remote.as_deref()))
        .await?;

    Ok(Json(jobs))
}
