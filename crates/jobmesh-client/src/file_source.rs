use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use jobmesh_core::{
    AppError, FetchParams, HealthCheckResult, JobRecord, JobSource, SourceType, SupportedParams,
};

use crate::mapping::parse_jobs;

fn default_source_type() -> SourceType {
    SourceType::ApiAggregator
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSourceConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_source_type")]
    pub source_type: SourceType,
}

impl FileSourceConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            source_type: default_source_type(),
        }
    }
}

/// Job source reading a local JSON file (exports, fixtures, scraper dumps).
///
/// The file is re-read on every fetch, and filtering happens here since there
/// is no backend to do it.
#[derive(Debug, Clone)]
pub struct FileSource {
    config: FileSourceConfig,
}

impl FileSource {
    pub fn new(config: FileSourceConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }

    async fn load(&self) -> Result<Vec<JobRecord>, AppError> {
        let path = &self.config.path;
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::SourceUnavailable(format!("Cannot read {}: {e}", path.display()))
        })?;
        let body: serde_json::Value = serde_json::from_str(&contents)?;
        parse_jobs(body, &self.config.name, self.config.source_type)
    }
}

#[async_trait]
impl JobSource for FileSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        self.config.source_type
    }

    async fn fetch_jobs(&self, params: &FetchParams) -> Result<Vec<JobRecord>, AppError> {
        let jobs = self.load().await?;
        Ok(jobs
            .into_iter()
            .filter(|job| matches_params(job, params))
            .skip(params.offset)
            .take(params.limit)
            .collect())
    }

    async fn health_check(&self) -> Result<HealthCheckResult, AppError> {
        match self.load().await {
            Ok(jobs) => Ok(HealthCheckResult::healthy(format!("{} postings", jobs.len()))
                .with_detail("path", self.config.path.display().to_string().into())
                .with_detail("job_count", jobs.len().into())),
            Err(e) => Ok(HealthCheckResult::unhealthy(e.to_string())),
        }
    }

    fn supported_params(&self) -> SupportedParams {
        SupportedParams::all()
    }
}

/// Keywords match if any of them occurs in the title or description. Location
/// and company are substring matches. All comparisons ignore case.
pub(crate) fn matches_params(job: &JobRecord, params: &FetchParams) -> bool {
    let keywords = params.effective_keywords();
    if !keywords.is_empty() {
        let text = format!(
            "{} {}",
            job.title,
            job.description.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        if !keywords.iter().any(|k| text.contains(&k.to_lowercase())) {
            return false;
        }
    }

    if !contains_ci(job.location.as_deref(), params.location.as_deref()) {
        return false;
    }
    if !contains_ci(Some(job.company.as_str()), params.company.as_deref()) {
        return false;
    }

    if let (Some(days), Some(posted)) = (params.date_range_days, job.date_posted)
        && let Some(cutoff) = date_cutoff(days)
        && posted < cutoff
    {
        return false;
    }
    true
}

/// Oldest acceptable posting date, or `None` when the window reaches past the
/// representable range (no lower bound).
fn date_cutoff(days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days)).and_then(|window| Utc::now().checked_sub_signed(window))
}

fn contains_ci(field: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted.map(str::trim).filter(|w| !w.is_empty()) {
        None => true,
        Some(wanted) => field.is_some_and(|f| f.to_lowercase().contains(&wanted.to_lowercase())),
    }
}
