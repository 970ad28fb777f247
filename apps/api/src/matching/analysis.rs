//! Keyword scoring of resume text against a job category.
//!
//! score = matched / total × 100, then pulled toward `min_score`: raised to it
//! when a critical keyword matched, capped at it otherwise.

use serde::Serialize;

use crate::matching::categories::JobCategory;

const MAX_MISSING_SUGGESTED: usize = 5;
const MAX_SEARCH_KEYWORDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeAnalysis {
    /// 0 – 100
    pub score: u32,
    pub matching_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn analyze_resume(text: &str, category: &JobCategory) -> ResumeAnalysis {
    let text = text.to_lowercase();

    let (matching, missing): (Vec<&str>, Vec<&str>) = category
        .keywords
        .iter()
        .copied()
        .partition(|keyword| text.contains(&keyword.to_lowercase()));

    let keyword_score = if category.keywords.is_empty() {
        0.0
    } else {
        matching.len() as f64 / category.keywords.len() as f64 * 100.0
    };
    let has_critical = category
        .critical_keywords
        .iter()
        .any(|critical| matching.contains(critical));
    let score = if has_critical {
        keyword_score.max(category.min_score)
    } else {
        keyword_score.min(category.min_score)
    };

    let mut suggestions = vec![format!(
        "Your resume matches {} keywords for {} positions.",
        matching.len(),
        category.name
    )];
    if !matching.is_empty() {
        suggestions.push(format!("Matching keywords: {}", matching.join(", ")));
    }
    if !missing.is_empty() {
        let shown: Vec<&str> = missing.iter().take(MAX_MISSING_SUGGESTED).copied().collect();
        suggestions.push(format!(
            "Consider adding these relevant keywords: {}",
            shown.join(", ")
        ));
    }
    suggestions.extend(category.advice.iter().map(|a| a.to_string()));

    ResumeAnalysis {
        score: score.round() as u32,
        matching_keywords: matching.into_iter().map(String::from).collect(),
        missing_keywords: missing.into_iter().map(String::from).collect(),
        suggestions,
    }
}

/// Keywords to search jobs with: the first matches, or the category's own
/// keywords when nothing matched.
pub fn search_keywords(analysis: &ResumeAnalysis, category: &JobCategory) -> Vec<String> {
    if analysis.matching_keywords.is_empty() {
        category
            .keywords
            .iter()
            .take(MAX_SEARCH_KEYWORDS)
            .map(|k| k.to_string())
            .collect()
    } else {
        analysis
            .matching_keywords
            .iter()
            .take(MAX_SEARCH_KEYWORDS)
            .cloned()
            .collect()
    }
}
