use crate::jobs::JobSearch;
use crate::queue::ApplicationQueue;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Intake side of the application queue. Consumers hold their own store handle.
    pub queue: ApplicationQueue,
    pub jobs: JobSearch,
}
