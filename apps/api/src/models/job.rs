use serde::{Deserialize, Serialize};

/// A job posting normalized across search providers.
///
/// `redirect_url` is the only field the application pipeline consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub redirect_url: String,
    pub category: Option<String>,
    pub is_remote: bool,
    pub country: String,
}
