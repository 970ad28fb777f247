//! RapidAPI JSearch client.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::jobs::{ensure_success, http_client, JobSearchError};
use crate::matching::categories::JobCategory;
use crate::models::job::JobListing;

const PROVIDER: &str = "JSearch";
const JSEARCH_BASE_URL: &str = "https://jsearch.p.rapidapi.com";
const JSEARCH_HOST: &str = "jsearch.p.rapidapi.com";

#[derive(Debug, Deserialize)]
struct JSearchResponse {
    data: Option<Vec<JSearchJob>>,
}

#[derive(Debug, Deserialize)]
struct JSearchJob {
    job_id: Option<String>,
    job_title: Option<String>,
    employer_name: Option<String>,
    job_city: Option<String>,
    job_country: Option<String>,
    job_description: Option<String>,
    job_min_salary: Option<f64>,
    job_max_salary: Option<f64>,
    job_apply_link: Option<String>,
    job_is_remote: Option<bool>,
}

impl JSearchJob {
    /// `None` when the posting has no apply link; there is nothing to apply to.
    fn into_listing(self, category: &str) -> Option<JobListing> {
        let redirect_url = self.job_apply_link.filter(|u| !u.trim().is_empty())?;
        let country = self.job_country.unwrap_or_default();
        let location = match self.job_city.filter(|c| !c.is_empty()) {
            Some(city) => format!("{city}, {country}"),
            None => country.clone(),
        };

        Some(JobListing {
            id: self.job_id.unwrap_or_else(|| redirect_url.clone()),
            title: self.job_title.unwrap_or_default(),
            company: self
                .employer_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unknown Company".to_string()),
            location,
            description: self.job_description.unwrap_or_default(),
            salary_min: self.job_min_salary.filter(|s| *s > 0.0),
            salary_max: self.job_max_salary.filter(|s| *s > 0.0),
            redirect_url,
            category: Some(category.to_string()),
            is_remote: self.job_is_remote.unwrap_or(false),
            country,
        })
    }
}

/// Builds the free-text query sent to JSearch.
pub fn search_query(category: &JobCategory, keywords: &[String], include_remote: bool) -> String {
    let base = if category.name == "officeAdmin" {
        "administrative OR office".to_string()
    } else {
        keywords
            .first()
            .cloned()
            .or_else(|| category.keywords.first().map(|k| k.to_string()))
            .unwrap_or_else(|| category.name.to_string())
    };
    if include_remote {
        format!("{base} remote")
    } else {
        base
    }
}

#[derive(Clone)]
pub struct JSearchClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl JSearchClient {
    pub fn new(api_key: String) -> Result<Self, JobSearchError> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: JSEARCH_BASE_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn search(
        &self,
        category: &JobCategory,
        keywords: &[String],
        include_remote: bool,
    ) -> Result<Vec<JobListing>, JobSearchError> {
        let query = search_query(category, keywords, include_remote);
        debug!("JSearch query: '{query}'");

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("query", query.as_str()), ("page", "1"), ("num_pages", "1")])
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", JSEARCH_HOST)
            .send()
            .await?;
        let body: JSearchResponse = ensure_success(PROVIDER, response).await?.json().await?;

        let jobs: Vec<JobListing> = body
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|job| job.into_listing(category.name))
            .collect();
        info!("JSearch found {} jobs for category {}", jobs.len(), category.name);
        Ok(jobs)
    }
}
