use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use jobmesh_core::{
    AppError, FetchParams, HealthCheckResult, HealthStatus, JobRecord, JobSource,
    RateLimitConfig, SourceType, SupportedParams,
};

use crate::mapping::parse_jobs;

fn default_timeout_secs() -> u64 {
    30
}

fn default_degraded_ms() -> u64 {
    2_000
}

fn default_source_type() -> SourceType {
    SourceType::ApiAggregator
}

/// Settings for one [`HttpFeedSource`], as found in a source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    pub name: String,
    /// JSON endpoint queried on every fetch.
    pub endpoint: String,
    /// Probed by health checks. Defaults to `endpoint`.
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default = "default_source_type")]
    pub source_type: SourceType,
    /// Environment variable holding a bearer token.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Health probes slower than this report `degraded`.
    #[serde(default = "default_degraded_ms")]
    pub degraded_threshold_ms: u64,
    #[serde(default)]
    pub rate_limits: Option<RateLimitConfig>,
    /// Keys of [`FetchParams::extra`] forwarded as query parameters.
    #[serde(default)]
    pub extra_params: Vec<String>,
}

impl FeedSourceConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            health_url: None,
            source_type: default_source_type(),
            token_env: None,
            timeout_secs: default_timeout_secs(),
            degraded_threshold_ms: default_degraded_ms(),
            rate_limits: None,
            extra_params: Vec::new(),
        }
    }
}

/// Job source backed by a JSON-over-HTTP feed.
///
/// HTTP outcomes are translated into the source failure kinds: 401/403 are
/// authentication failures, 429 is rate limiting (honouring `Retry-After`),
/// 5xx and transport errors mean the source is unavailable.
#[derive(Clone)]
pub struct HttpFeedSource {
    config: FeedSourceConfig,
    endpoint: Url,
    health_url: Url,
    token: Option<String>,
    client: Client,
}

impl std::fmt::Debug for HttpFeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFeedSource")
            .field("name", &self.config.name)
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl HttpFeedSource {
    pub fn new(config: FeedSourceConfig) -> Result<Self, AppError> {
        let endpoint = parse_http_url(&config.endpoint)?;
        let health_url = match &config.health_url {
            Some(url) => parse_http_url(url)?,
            None => endpoint.clone(),
        };
        let token = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.trim().is_empty());

        let client = Client::builder()
            .user_agent(concat!("Jobmesh/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            config,
            endpoint,
            health_url,
            token,
            client,
        })
    }

    pub fn config(&self) -> &FeedSourceConfig {
        &self.config
    }

    /// The URL a fetch with `params` would request.
    pub fn request_url(&self, params: &FetchParams) -> Url {
        build_request_url(&self.endpoint, params, &self.config.extra_params)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl JobSource for HttpFeedSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source_type(&self) -> SourceType {
        self.config.source_type
    }

    async fn fetch_jobs(&self, params: &FetchParams) -> Result<Vec<JobRecord>, AppError> {
        let url = self.request_url(params);
        tracing::debug!(source = %self.config.name, %url, "Fetching feed");

        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(&e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response.headers()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to decode feed body: {e}")))?;

        let mut jobs = parse_jobs(body, &self.config.name, self.config.source_type)?;
        jobs.truncate(params.limit);
        Ok(jobs)
    }

    async fn health_check(&self) -> Result<HealthCheckResult, AppError> {
        let started = Instant::now();
        let response = self
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&e, self.config.timeout_secs))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        Ok(
            health_from_status(response.status(), elapsed_ms, self.config.degraded_threshold_ms)
                .with_response_time(elapsed_ms)
                .with_detail("url", self.health_url.as_str().into()),
        )
    }

    fn rate_limits(&self) -> RateLimitConfig {
        self.config.rate_limits.clone().unwrap_or_default()
    }

    fn supported_params(&self) -> SupportedParams {
        let mut supported = SupportedParams::all();
        supported.extra = self.config.extra_params.clone();
        supported
    }

    async fn initialize(&self) -> Result<(), AppError> {
        match (&self.config.token_env, &self.token) {
            (Some(var), None) => Err(AppError::AuthenticationFailure(format!(
                "{var} is not set"
            ))),
            _ => Ok(()),
        }
    }
}

fn parse_http_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw).map_err(|e| AppError::ConfigError(format!("Invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AppError::ConfigError(format!(
            "URL scheme '{scheme}' is not allowed (only http/https)"
        ))),
    }
}

pub(crate) fn build_request_url(endpoint: &Url, params: &FetchParams, extra_keys: &[String]) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        let q = params.query();
        if !q.is_empty() {
            query.append_pair("q", &q);
        }
        if let Some(location) = params.location.as_deref().filter(|l| !l.trim().is_empty()) {
            query.append_pair("location", location.trim());
        }
        if let Some(company) = params.company.as_deref().filter(|c| !c.trim().is_empty()) {
            query.append_pair("company", company.trim());
        }
        query.append_pair("limit", &params.limit.to_string());
        if params.offset > 0 {
            query.append_pair("offset", &params.offset.to_string());
        }
        if let Some(days) = params.date_range_days {
            query.append_pair("days", &days.to_string());
        }
        for key in extra_keys {
            if let Some(value) = params.extra.get(key) {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                query.append_pair(key, &value);
            }
        }
    }
    url
}

pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap) -> AppError {
    match status.as_u16() {
        401 | 403 => AppError::AuthenticationFailure(format!("HTTP {}", status.as_u16())),
        429 => AppError::RateLimited {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after),
        },
        code if status.is_server_error() => AppError::SourceUnavailable(format!("HTTP {code}")),
        code => AppError::HttpError(format!("HTTP {code}")),
    }
}

/// Only the delay-seconds form of `Retry-After` is understood.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn transport_error(e: &reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::SourceUnavailable(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

pub(crate) fn health_from_status(
    status: StatusCode,
    elapsed_ms: u64,
    degraded_threshold_ms: u64,
) -> HealthCheckResult {
    if status == StatusCode::TOO_MANY_REQUESTS {
        HealthCheckResult::new(HealthStatus::Degraded, "Rate limited")
    } else if status.is_success() && elapsed_ms > degraded_threshold_ms {
        HealthCheckResult::new(
            HealthStatus::Degraded,
            format!("Slow response ({elapsed_ms}ms)"),
        )
    } else if status.is_success() {
        HealthCheckResult::healthy("OK")
    } else {
        HealthCheckResult::unhealthy(format!("HTTP {}", status.as_u16()))
    }
}
