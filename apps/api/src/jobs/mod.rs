//! Job search providers. Both are optional: a provider without credentials is
//! simply disabled and its endpoint answers 503.

pub mod adzuna;
pub mod aggregate;
pub mod handlers;
pub mod jsearch;

use std::time::Duration;

use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::jobs::adzuna::{AdzunaClient, AdzunaQuery};
use crate::jobs::aggregate::dedup_listings;
use crate::jobs::jsearch::JSearchClient;
use crate::matching::categories::JobCategory;
use crate::models::job::JobListing;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum JobSearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned status {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} is not configured")]
    Disabled(&'static str),
}

/// The configured job search providers.
#[derive(Clone, Default)]
pub struct JobSearch {
    jsearch: Option<JSearchClient>,
    adzuna: Option<AdzunaClient>,
}

impl JobSearch {
    pub fn new(jsearch: Option<JSearchClient>, adzuna: Option<AdzunaClient>) -> Self {
        Self { jsearch, adzuna }
    }

    pub fn from_config(config: &Config) -> Result<Self, JobSearchError> {
        let jsearch = config
            .jsearch_api_key
            .clone()
            .map(JSearchClient::new)
            .transpose()?;
        let adzuna = config
            .adzuna
            .clone()
            .map(AdzunaClient::new)
            .transpose()?;

        info!(
            "Job search providers: jsearch={}, adzuna={}",
            jsearch.is_some(),
            adzuna.is_some()
        );
        Ok(Self::new(jsearch, adzuna))
    }

    /// Searches JSearch for jobs in `category`, deduplicated by redirect URL.
    pub async fn search(
        &self,
        category: &JobCategory,
        keywords: &[String],
        include_remote: bool,
    ) -> Result<Vec<JobListing>, JobSearchError> {
        let client = self
            .jsearch
            .as_ref()
            .ok_or(JobSearchError::Disabled("JSearch"))?;
        let jobs = client.search(category, keywords, include_remote).await?;
        Ok(dedup_listings(jobs))
    }

    pub async fn adzuna(
        &self,
        query: AdzunaQuery<'_>,
        remote_only: bool,
    ) -> Result<Vec<JobListing>, JobSearchError> {
        let client = self
            .adzuna
            .as_ref()
            .ok_or(JobSearchError::Disabled("Adzuna"))?;
        let jobs = client.search(query, remote_only).await?;
        Ok(dedup_listings(jobs))
    }
}

fn http_client() -> Result<Client, JobSearchError> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// Turns a non-2xx response into `JobSearchError::Api`.
async fn ensure_success(
    provider: &'static str,
    response: Response,
) -> Result<Response, JobSearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    warn!("{provider} returned {status}: {message}");
    Err(JobSearchError::Api {
        provider,
        status: status.as_u16(),
        message,
    })
}
