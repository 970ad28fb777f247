/// Scoring profile for one family of jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobCategory {
    pub name: &'static str,
    /// Phrases looked for (case-insensitively) in resume text.
    pub keywords: &'static [&'static str],
    /// Adzuna category tag used when searching that provider.
    pub adzuna_category: &'static str,
    /// Matching any one of these lifts the score to at least `min_score`.
    pub critical_keywords: &'static [&'static str],
    pub min_score: f64,
    pub advice: &'static [&'static str],
}

pub const DEFAULT_CATEGORY: &str = "software";

pub const CATEGORIES: [JobCategory; 5] = [
    JobCategory {
        name: "software",
        keywords: &["javascript", "python", "java", "software developer", "programmer"],
        adzuna_category: "it-jobs",
        critical_keywords: &["javascript", "python", "java"],
        min_score: 40.0,
        advice: &[
            "Consider adding specific programming languages",
            "List your technical projects",
        ],
    },
    JobCategory {
        name: "marketing",
        keywords: &["marketing", "digital marketing", "social media"],
        adzuna_category: "marketing-jobs",
        critical_keywords: &["marketing"],
        min_score: 40.0,
        advice: &[
            "Highlight campaign metrics",
            "Include social media platforms managed",
        ],
    },
    JobCategory {
        name: "finance",
        keywords: &["accountant", "financial analyst", "finance"],
        adzuna_category: "finance-jobs",
        critical_keywords: &["accountant", "financial analyst"],
        min_score: 40.0,
        advice: &["Highlight financial metrics", "Include financial software"],
    },
    JobCategory {
        name: "healthcare",
        keywords: &["nurse", "doctor", "healthcare"],
        adzuna_category: "healthcare-jobs",
        critical_keywords: &["nurse", "doctor"],
        min_score: 40.0,
        advice: &["Highlight healthcare metrics", "Include healthcare software"],
    },
    JobCategory {
        name: "officeAdmin",
        keywords: &[
            "administrative assistant",
            "office manager",
            "receptionist",
            "administrator",
            "typing",
        ],
        adzuna_category: "admin-jobs",
        critical_keywords: &["administrative assistant", "office manager", "administrator", "typing"],
        min_score: 40.0,
        advice: &[
            "Highlight administrative metrics",
            "Include administrative software",
        ],
    },
];

pub fn find_category(name: &str) -> Option<&'static JobCategory> {
    CATEGORIES.iter().find(|c| c.name == name)
}

/// Comma-separated category names, for error messages.
pub fn category_names() -> String {
    CATEGORIES
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_category_is_exact() {
        assert_eq!(find_category("officeAdmin").unwrap().adzuna_category, "admin-jobs");
        assert!(find_category("officeadmin").is_none());
        assert!(find_category("plumbing").is_none());
        assert!(find_category(DEFAULT_CATEGORY).is_some());
    }

    #[test]
    fn test_critical_keywords_are_keywords() {
        for category in &CATEGORIES {
            for critical in category.critical_keywords {
                assert!(
                    category.keywords.contains(critical),
                    "{}: critical keyword '{critical}' is not a keyword",
                    category.name
                );
            }
        }
    }

    #[test]
    fn test_category_names_lists_all() {
        assert_eq!(
            category_names(),
            "software, marketing, finance, healthcare, officeAdmin"
        );
    }
}
