//! Adzuna job search client.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::AdzunaCredentials;
use crate::jobs::{ensure_success, http_client, JobSearchError};
use crate::models::job::JobListing;

const PROVIDER: &str = "Adzuna";
const ADZUNA_BASE_URL: &str = "https://api.adzuna.com";

/// What to search Adzuna for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdzunaQuery<'a> {
    /// An Adzuna category tag such as `it-jobs`.
    Category(&'a str),
    /// Free-text keywords.
    Keywords(&'a str),
}

#[derive(Debug, Deserialize)]
struct AdzunaResponse {
    #[serde(default)]
    results: Vec<AdzunaJob>,
}

#[derive(Debug, Deserialize)]
struct DisplayName {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaLocation {
    display_name: Option<String>,
    #[serde(default)]
    area: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaCategory {
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    id: Option<Value>,
    title: Option<String>,
    description: Option<String>,
    company: Option<DisplayName>,
    location: Option<AdzunaLocation>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    redirect_url: Option<String>,
    category: Option<AdzunaCategory>,
}

impl AdzunaJob {
    fn into_listing(self, default_country: &str) -> Option<JobListing> {
        let redirect_url = self.redirect_url.filter(|u| !u.trim().is_empty())?;
        let title = self.title.unwrap_or_default();
        let description = self.description.unwrap_or_default();
        let is_remote = title.to_lowercase().contains("remote")
            || description.to_lowercase().contains("remote");

        let (location, country) = match self.location {
            Some(location) => {
                let country = location
                    .area
                    .first()
                    .cloned()
                    .unwrap_or_else(|| default_country.to_uppercase());
                (location.display_name.unwrap_or_default(), country)
            }
            None => (String::new(), default_country.to_uppercase()),
        };
        let id = match self.id {
            Some(Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => redirect_url.clone(),
        };

        Some(JobListing {
            id,
            title,
            company: self
                .company
                .and_then(|c| c.display_name)
                .unwrap_or_else(|| "Unknown Company".to_string()),
            location,
            description,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            redirect_url,
            category: self.category.and_then(|c| c.tag),
            is_remote,
            country,
        })
    }
}

#[derive(Clone)]
pub struct AdzunaClient {
    client: Client,
    credentials: AdzunaCredentials,
    base_url: String,
}

impl AdzunaClient {
    pub fn new(credentials: AdzunaCredentials) -> Result<Self, JobSearchError> {
        Ok(Self {
            client: http_client()?,
            credentials,
            base_url: ADZUNA_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// First page of results. With `remote_only`, keeps listings that mention
    /// "remote" in their title or description.
    pub async fn search(
        &self,
        query: AdzunaQuery<'_>,
        remote_only: bool,
    ) -> Result<Vec<JobListing>, JobSearchError> {
        let url = format!(
            "{}/v1/api/jobs/{}/search/1",
            self.base_url, self.credentials.country
        );
        let (key, value) = match query {
            AdzunaQuery::Category(tag) => ("category", tag),
            AdzunaQuery::Keywords(what) => ("what", what),
        };

        let response = self
            .client
            .get(url)
            .query(&[
                ("app_id", self.credentials.app_id.as_str()),
                ("app_key", self.credentials.api_key.as_str()),
                (key, value),
                ("content-type", "application/json"),
            ])
            .send()
            .await?;
        let body: AdzunaResponse = ensure_success(PROVIDER, response).await?.json().await?;

        let mut jobs: Vec<JobListing> = body
            .results
            .into_iter()
            .filter_map(|job| job.into_listing(&self.credentials.country))
            .collect();
        if remote_only {
            jobs.retain(|job| job.is_remote);
        }
        info!("Adzuna found {} jobs for {key}={value}", jobs.len());
        Ok(jobs)
    }
}
