use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{
    FetchParams, HealthCheckResult, JobRecord, RateLimitConfig, SourceType, SupportedParams,
};

/// A job source: an API client or a browser-driven scraper behind one contract.
///
/// Sources are stored in the registry as `Arc<dyn JobSource>` and may be called
/// from several aggregation runs at once, so implementations own their internal
/// synchronisation (one browser session per instance, connection pools, ...).
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Fetch postings matching `params`.
    ///
    /// Must return within a bounded time. Expected failures are signalled as
    /// [`AppError::SourceUnavailable`], [`AppError::AuthenticationFailure`] or
    /// [`AppError::RateLimited`]; anything else is treated as unclassified.
    async fn fetch_jobs(&self, params: &FetchParams) -> Result<Vec<JobRecord>, AppError>;

    /// Probe the source. An `Err` is recorded as unhealthy by the registry.
    async fn health_check(&self) -> Result<HealthCheckResult, AppError>;

    /// Declared limits. The source enforces them; callers only observe them.
    fn rate_limits(&self) -> RateLimitConfig {
        RateLimitConfig::default()
    }

    fn supported_params(&self) -> SupportedParams;

    /// One-time setup (sessions, tokens). Called before the first fetch.
    async fn initialize(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Release resources. Called on unregistration.
    async fn cleanup(&self) -> Result<(), AppError> {
        Ok(())
    }
}
