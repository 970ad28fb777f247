use std::collections::{BTreeMap, HashSet};

use crate::models::job::JobListing;

const UNKNOWN_COUNTRY: &str = "Unknown";

/// Groups listings by country, keeping each group in input order.
pub fn group_by_country(jobs: &[JobListing]) -> BTreeMap<String, Vec<JobListing>> {
    let mut grouped: BTreeMap<String, Vec<JobListing>> = BTreeMap::new();
    for job in jobs {
        let country = if job.country.trim().is_empty() {
            UNKNOWN_COUNTRY.to_string()
        } else {
            job.country.clone()
        };
        grouped.entry(country).or_default().push(job.clone());
    }
    grouped
}

/// Drops listings whose redirect URL was already seen. First one wins.
pub fn dedup_listings(jobs: Vec<JobListing>) -> Vec<JobListing> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|job| seen.insert(job.redirect_url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, url: &str, country: &str) -> JobListing {
        JobListing {
            id: id.to_string(),
            title: format!("Job {id}"),
            company: "Acme".to_string(),
            location: country.to_string(),
            description: String::new(),
            salary_min: None,
            salary_max: None,
            redirect_url: url.to_string(),
            category: None,
            is_remote: false,
            country: country.to_string(),
        }
    }

    #[test]
    fn test_group_by_country() {
        let jobs = vec![
            listing("1", "https://a/1", "US"),
            listing("2", "https://a/2", "DE"),
            listing("3", "https://a/3", "US"),
            listing("4", "https://a/4", ""),
        ];
        let grouped = group_by_country(&jobs);

        assert_eq!(grouped.len(), 3);
        let us: Vec<&str> = grouped["US"].iter().map(|j| j.id.as_str()).collect();
        assert_eq!(us, vec!["1", "3"]);
        assert_eq!(grouped["Unknown"][0].id, "4");
    }

    #[test]
    fn test_dedup_keeps_first_listing() {
        let jobs = vec![
            listing("1", "https://a/1", "US"),
            listing("2", "https://a/1", "US"),
            listing("3", "https://a/3", "US"),
        ];
        let ids: Vec<String> = dedup_listings(jobs).into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
