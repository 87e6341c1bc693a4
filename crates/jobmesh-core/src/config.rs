use std::time::Duration;

use crate::enrichment::DEFAULT_DOMAIN_KEYWORDS;
use crate::error::AppError;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Configuration for an [`Orchestrator`](crate::orchestrator::Orchestrator).
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Upper bound on sources fetched at the same time.
    pub max_concurrent: usize,
    /// Per-source fetch deadline. `None` waits for every source.
    pub fetch_timeout: Option<Duration>,
    pub domain_keywords: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            fetch_timeout: None,
            domain_keywords: DEFAULT_DOMAIN_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn with_domain_keywords(mut self, keywords: Vec<String>) -> Self {
        self.domain_keywords = keywords;
        self
    }

    /// Read configuration from environment variables.
    ///
    /// - `JOBMESH_MAX_CONCURRENT` (optional, defaults to 5)
    /// - `JOBMESH_FETCH_TIMEOUT_SECS` (optional, no timeout when unset)
    /// - `JOBMESH_DOMAIN_KEYWORDS` (optional, comma separated)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("JOBMESH_MAX_CONCURRENT") {
            let parsed: usize = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid JOBMESH_MAX_CONCURRENT '{raw}': must be a positive integer"
                ))
            })?;
            if parsed == 0 {
                return Err(AppError::ConfigError(
                    "JOBMESH_MAX_CONCURRENT must be at least 1".into(),
                ));
            }
            config.max_concurrent = parsed;
        }

        if let Some(raw) = lookup("JOBMESH_FETCH_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid JOBMESH_FETCH_TIMEOUT_SECS '{raw}': must be a number of seconds"
                ))
            })?;
            if secs == 0 {
                return Err(AppError::ConfigError(
                    "JOBMESH_FETCH_TIMEOUT_SECS must be at least 1".into(),
                ));
            }
            config.fetch_timeout = Some(Duration::from_secs(secs));
        }

        if let Some(raw) = lookup("JOBMESH_DOMAIN_KEYWORDS") {
            let keywords: Vec<String> = raw
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                return Err(AppError::ConfigError(
                    "JOBMESH_DOMAIN_KEYWORDS is set but contains no keywords".into(),
                ));
            }
            config.domain_keywords = keywords;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_concurrent == 0 {
            return Err(AppError::ConfigError(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.fetch_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AppError::ConfigError(
                "fetch_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
