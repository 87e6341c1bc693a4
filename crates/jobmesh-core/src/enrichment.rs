use chrono::{DateTime, Utc};

use crate::models::{AggregatedJob, JobLevel, JobRecord};

pub const DEFAULT_DOMAIN_KEYWORDS: &[&str] = &[
    "technical product manager",
    "tpm",
    "product manager",
    "roadmap",
    "stakeholder",
    "cross-functional",
    "agile",
    "scrum",
    "okr",
    "go-to-market",
];

const SENIOR_MARKERS: &[&str] = &["senior", "sr", "lead", "principal", "staff"];
const ENTRY_MARKERS: &[&str] = &["junior", "entry", "associate", "intern"];
const EXECUTIVE_MARKERS: &[&str] = &[
    "manager",
    "director",
    "vp",
    "head of",
    "ceo",
    "cto",
    "executive",
];
const REMOTE_MARKERS: &[&str] = &[
    "remote",
    "work from home",
    "wfh",
    "telecommute",
    "distributed",
];

/// Bucket a title by seniority. Markers are plain substrings, checked
/// senior, then entry, then executive; the first hit wins.
pub fn classify_job_level(title: &str) -> JobLevel {
    let title = title.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| title.contains(m));

    if has_any(SENIOR_MARKERS) {
        JobLevel::Senior
    } else if has_any(ENTRY_MARKERS) {
        JobLevel::Entry
    } else if has_any(EXECUTIVE_MARKERS) {
        JobLevel::Executive
    } else {
        JobLevel::MidLevel
    }
}

pub fn is_remote_friendly(title: &str, location: Option<&str>, description: Option<&str>) -> bool {
    [Some(title), location, description]
        .into_iter()
        .flatten()
        .any(|field| {
            let field = field.to_lowercase();
            REMOTE_MARKERS.iter().any(|m| field.contains(m))
        })
}

/// Sum of non-overlapping, case-insensitive occurrences of every keyword in
/// the title and the description. Each field is counted on its own, so a
/// phrase never matches across the two. Blank keywords are ignored.
pub fn count_domain_keywords<S: AsRef<str>>(
    title: &str,
    description: Option<&str>,
    keywords: &[S],
) -> usize {
    let title = title.to_lowercase();
    let description = description.map(str::to_lowercase);
    keywords
        .iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| {
            title.matches(k.as_str()).count()
                + description
                    .as_deref()
                    .map_or(0, |d| d.matches(k.as_str()).count())
        })
        .sum()
}

/// Attaches derived metadata to deduplicated records.
#[derive(Debug, Clone)]
pub struct Enricher {
    keywords: Vec<String>,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

impl Enricher {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn enrich(&self, jobs: &[JobRecord]) -> Vec<AggregatedJob> {
        let now = Utc::now();
        jobs.iter().map(|job| self.enrich_one(job, now)).collect()
    }

    /// Builds a new [`AggregatedJob`]; `job` itself is left untouched.
    pub fn enrich_one(&self, job: &JobRecord, now: DateTime<Utc>) -> AggregatedJob {
        let mut record = job.clone();
        let aggregated_at = record.aggregated_at.take().unwrap_or(now);

        AggregatedJob {
            job_type: classify_job_level(&record.title),
            remote_friendly: is_remote_friendly(
                &record.title,
                record.location.as_deref(),
                record.description.as_deref(),
            ),
            keyword_matches: count_domain_keywords(
                &record.title,
                record.description.as_deref(),
                self.keywords.as_slice(),
            ),
            aggregated_at,
            job: record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::job;

    #[test]
    fn test_classification_literals() {
        assert_eq!(classify_job_level("Senior Product Manager"), JobLevel::Senior);
        assert_eq!(classify_job_level("Staff Engineer"), JobLevel::Senior);
        assert_eq!(classify_job_level("Junior Analyst"), JobLevel::Entry);
        assert_eq!(classify_job_level("Associate PM"), JobLevel::Entry);
        assert_eq!(classify_job_level("Director of Product"), JobLevel::Executive);
        assert_eq!(classify_job_level("Head of Growth"), JobLevel::Executive);
        assert_eq!(classify_job_level("Product Manager"), JobLevel::Executive);
        assert_eq!(classify_job_level("Data Scientist"), JobLevel::MidLevel);
    }

    #[test]
    fn test_classification_reference_titles() {
        assert_eq!(classify_job_level("Senior Python Developer"), JobLevel::Senior);
        assert_eq!(classify_job_level("Junior Software Engineer"), JobLevel::Entry);
        assert_eq!(classify_job_level("Engineering Manager"), JobLevel::Executive);
        assert_eq!(classify_job_level("Python Developer"), JobLevel::MidLevel);
    }

    #[test]
    fn test_senior_beats_executive() {
        assert_eq!(classify_job_level("Lead Engineering Manager"), JobLevel::Senior);
        assert_eq!(classify_job_level("SENIOR DIRECTOR"), JobLevel::Senior);
    }

    #[test]
    fn test_remote_literals() {
        assert!(is_remote_friendly("PM (Remote)", None, None));
        assert!(is_remote_friendly("PM", Some("Work From Home"), None));
        assert!(is_remote_friendly("PM", Some("Berlin"), Some("fully distributed team")));
        assert!(is_remote_friendly("PM", None, Some("WFH two days")));
        assert!(!is_remote_friendly("PM", Some("Berlin"), Some("on-site only")));
    }

    #[test]
    fn test_remote_location_only() {
        assert!(is_remote_friendly("Product Manager", Some("Remote"), None));
        assert!(!is_remote_friendly(
            "Product Manager",
            Some("San Francisco, CA"),
            None
        ));
    }

    #[test]
    fn test_keyword_count_non_overlapping() {
        let keywords = ["product manager", "roadmap"];
        let n = count_domain_keywords(
            "Product Manager",
            Some("Own the roadmap. Roadmap reviews with the product manager team."),
            &keywords,
        );
        assert_eq!(n, 4);

        assert_eq!(count_domain_keywords("aaaa", None, &["aa"]), 2);
        assert_eq!(count_domain_keywords("anything", None, &["", "  "]), 0);
    }

    #[test]
    fn test_keyword_never_spans_title_and_description() {
        let n = count_domain_keywords(
            "Technical Product",
            Some("Manager for payments"),
            &["product manager"],
        );
        assert_eq!(n, 0);

        let n = count_domain_keywords(
            "Product Manager",
            Some("Product Manager, payments"),
            &["product manager"],
        );
        assert_eq!(n, 2);
    }

    #[test]
    fn test_default_keywords_overlap_between_entries() {
        // "technical product manager" also contains "product manager".
        let n = count_domain_keywords(
            "Technical Product Manager",
            None,
            DEFAULT_DOMAIN_KEYWORDS,
        );
        assert_eq!(n, 2);
    }

    #[test]
    fn test_enrich_preserves_existing_aggregated_at() {
        let stamp = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut record = job("a", "1", "Senior PM", "Acme");
        record.aggregated_at = Some(stamp);

        let enriched = Enricher::default().enrich(std::slice::from_ref(&record));

        assert_eq!(enriched[0].aggregated_at, stamp);
        assert!(enriched[0].job.aggregated_at.is_none());
        // Input is untouched.
        assert_eq!(record.aggregated_at, Some(stamp));
    }

    #[test]
    fn test_enrich_sets_metadata() {
        let record = job("a", "1", "Remote Technical Product Manager", "Acme")
            .with_description("Drive the roadmap with stakeholders");
        let now = Utc::now();

        let enriched = Enricher::default().enrich_one(&record, now);

        assert_eq!(enriched.job_type, JobLevel::Executive);
        assert!(enriched.remote_friendly);
        assert_eq!(enriched.keyword_matches, 4);
        assert_eq!(enriched.aggregated_at, now);
        assert_eq!(enriched.job.source, "a");
    }
}
