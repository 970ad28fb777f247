pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::apply::handlers as apply;
use crate::jobs::handlers as jobs;
use crate::matching::handlers as matching;
use crate::state::AppState;

/// Resume uploads and base64 mass-apply bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Application pipeline
        .route(
            "/api/v1/applications/mass-apply",
            post(apply::handle_mass_apply),
        )
        .route("/api/v1/applications/:id", get(apply::handle_get_application))
        // Resume analysis
        .route("/api/v1/resumes/analyze", post(matching::handle_analyze_resume))
        // Job search
        .route("/api/v1/jobs/search", get(jobs::handle_search_jobs))
        .route("/api/v1/jobs/adzuna", get(jobs::handle_adzuna_jobs))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
