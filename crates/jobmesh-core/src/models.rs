use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, FailureKind};

const DEFAULT_LIMIT: usize = 50;

/// How a source obtains its postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    ApiAggregator,
    BrowserScraper,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ApiAggregator => "api_aggregator",
            SourceType::BrowserScraper => "browser_scraper",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api_aggregator" | "api" => Ok(SourceType::ApiAggregator),
            "browser_scraper" | "scraper" | "browser" => Ok(SourceType::BrowserScraper),
            _ => Err(format!("Unknown source type: {s}")),
        }
    }
}

/// Health of a source as last observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// Never probed.
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Unknown counts as eligible: a source that was never probed gets the benefit of the doubt.
    pub fn is_eligible(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
}

impl HealthCheckResult {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: Utc::now(),
            response_time_ms: 0,
            details: None,
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    pub fn unknown() -> Self {
        Self::new(HealthStatus::Unknown, "Not checked yet")
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Rate limits a source declares. Enforcement is the source's own business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub burst_limit: u32,
    pub backoff_factor: f64,
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
            burst_limit: 10,
            backoff_factor: 2.0,
            max_retries: 3,
        }
    }
}

/// Which search parameters a source understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedParams {
    pub keywords: bool,
    pub location: bool,
    pub company: bool,
    pub limit: bool,
    pub offset: bool,
    pub date_range: bool,
    /// Source-specific keys accepted through [`FetchParams::extra`].
    #[serde(default)]
    pub extra: Vec<String>,
}

impl SupportedParams {
    /// Every standard parameter supported, no extras.
    pub fn all() -> Self {
        Self {
            keywords: true,
            location: true,
            company: true,
            limit: true,
            offset: true,
            date_range: true,
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>) -> Self {
        self.extra.push(key.into());
        self
    }
}

/// Search criteria for one aggregation request, shared read-only by every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchParams {
    pub keywords: Vec<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub date_range_days: Option<u32>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            location: None,
            company: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            date_range_days: None,
            extra: BTreeMap::new(),
        }
    }
}

impl FetchParams {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_date_range_days(mut self, days: u32) -> Self {
        self.date_range_days = Some(days);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Keywords with surrounding whitespace removed and blanks dropped.
    pub fn effective_keywords(&self) -> Vec<&str> {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Keywords joined into a single query string.
    pub fn query(&self) -> String {
        self.effective_keywords().join(" ")
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let has_location = self
            .location
            .as_deref()
            .is_some_and(|l| !l.trim().is_empty());
        if self.effective_keywords().is_empty() && !has_location {
            return Err(AppError::ValidationFailure(
                "at least one keyword or a location is required".into(),
            ));
        }
        if self.limit == 0 {
            return Err(AppError::ValidationFailure(
                "limit must be at least 1".into(),
            ));
        }
        if self.date_range_days == Some(0) {
            return Err(AppError::ValidationFailure(
                "date range must be at least 1 day".into(),
            ));
        }
        Ok(())
    }
}

/// A posting as returned by a source, before deduplication and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique within its source only.
    pub id: String,
    pub source: String,
    pub source_type: SourceType,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub date_posted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw: serde_json::Value,
    /// Pre-set by sources that re-publish already aggregated feeds.
    /// Moved onto [`AggregatedJob::aggregated_at`] during enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_type: SourceType,
        title: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_type,
            title: title.into(),
            company: company.into(),
            location: None,
            url: None,
            description: None,
            salary: None,
            date_posted: None,
            raw: serde_json::Value::Null,
            aggregated_at: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_salary(mut self, salary: impl Into<String>) -> Self {
        self.salary = Some(salary.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    /// The URL if present and non-empty.
    pub fn url_identity(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }

    /// Lower-cased `(title, company)` pair used as the secondary dedup identity.
    pub fn pair_identity(&self) -> (String, String) {
        (self.title.to_lowercase(), self.company.to_lowercase())
    }
}

/// Seniority bucket derived from the job title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLevel {
    Senior,
    Entry,
    Executive,
    MidLevel,
}

impl JobLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobLevel::Senior => "senior",
            JobLevel::Entry => "entry",
            JobLevel::Executive => "executive",
            JobLevel::MidLevel => "mid_level",
        }
    }
}

impl fmt::Display for JobLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deduplicated posting with derived metadata attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedJob {
    #[serde(flatten)]
    pub job: JobRecord,
    pub job_type: JobLevel,
    pub remote_friendly: bool,
    pub keyword_matches: usize,
    pub aggregated_at: DateTime<Utc>,
}

/// Why a source failed during an aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&AppError> for SourceFailure {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after_secs: err.retry_after().map(|d| d.as_secs()),
        }
    }
}

/// Per-source bookkeeping for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub success: bool,
    pub jobs_returned: usize,
    pub elapsed_ms: u64,
}

/// Everything one aggregation run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationResult {
    pub run_id: Uuid,
    pub jobs: Vec<AggregatedJob>,
    pub total_collected: usize,
    pub total_deduplicated: usize,
    pub duplicates_removed: usize,
    pub sources_queried: Vec<String>,
    pub successful_sources: usize,
    pub failed_sources: usize,
    pub per_source: BTreeMap<String, SourceOutcome>,
    pub errors: BTreeMap<String, SourceFailure>,
    /// Sources that were named or registered but not queried, with the reason.
    pub skipped_sources: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AggregationResult {
    /// An empty result for a run that had nothing to query.
    pub fn empty(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        Self {
            run_id,
            jobs: Vec::new(),
            total_collected: 0,
            total_deduplicated: 0,
            duplicates_removed: 0,
            sources_queried: Vec::new(),
            successful_sources: 0,
            failed_sources: 0,
            per_source: BTreeMap::new(),
            errors: BTreeMap::new(),
            skipped_sources: BTreeMap::new(),
            started_at,
            finished_at,
            duration_ms: elapsed_ms(started_at, finished_at),
        }
    }

    pub fn total_jobs(&self) -> usize {
        self.jobs.len()
    }
}

pub(crate) fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
