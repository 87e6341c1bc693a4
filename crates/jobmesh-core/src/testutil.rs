//! Test utilities: a configurable mock source, a recording reporter, and job builders.
//!
//! Mocks use `Arc<Mutex<_>>` / atomics for interior mutability so tests can
//! assert on recorded calls after handing the mock to the registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{
    FetchParams, HealthCheckResult, HealthStatus, JobRecord, RateLimitConfig, SourceType,
    SupportedParams,
};
use crate::reporter::{AggregationEvent, AggregationReporter};
use crate::traits::JobSource;

/// Rebuild an error so a mock can return it on every call.
fn replay(err: &AppError) -> AppError {
    match err {
        AppError::SourceUnavailable(m) => AppError::SourceUnavailable(m.clone()),
        AppError::AuthenticationFailure(m) => AppError::AuthenticationFailure(m.clone()),
        AppError::RateLimited { retry_after } => AppError::RateLimited {
            retry_after: *retry_after,
        },
        AppError::ValidationFailure(m) => AppError::ValidationFailure(m.clone()),
        AppError::Timeout(s) => AppError::Timeout(*s),
        AppError::HttpError(m) => AppError::HttpError(m.clone()),
        AppError::ConfigError(m) => AppError::ConfigError(m.clone()),
        AppError::SerializationError(e) => AppError::Generic(e.to_string()),
        AppError::Generic(m) => AppError::Generic(m.clone()),
    }
}

// ---------------------------------------------------------------------------
// Job builders
// ---------------------------------------------------------------------------

/// A minimal API record with a URL derived from `source` and `id`.
pub fn job(source: &str, id: &str, title: &str, company: &str) -> JobRecord {
    JobRecord::new(id, source, SourceType::ApiAggregator, title, company)
        .with_url(format!("https://{source}.example.com/jobs/{id}"))
}

/// A record without a URL, so only the (title, company) identity applies.
pub fn job_without_url(source: &str, id: &str, title: &str, company: &str) -> JobRecord {
    JobRecord::new(id, source, SourceType::ApiAggregator, title, company)
}

// ---------------------------------------------------------------------------
// ConcurrencyProbe
// ---------------------------------------------------------------------------

/// Tracks how many mock fetches are in flight at once.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of simultaneous fetches observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum HealthBehavior {
    Status(HealthStatus),
    Error(Arc<AppError>),
    Panic,
}

/// Mock job source with configurable fetch, health, and lifecycle behavior.
#[derive(Clone)]
pub struct MockSource {
    name: String,
    source_type: SourceType,
    jobs: Vec<JobRecord>,
    fetch_error: Option<Arc<AppError>>,
    panic_on_fetch: bool,
    delay: Duration,
    health: HealthBehavior,
    init_error: Option<Arc<AppError>>,
    cleanup_error: Option<Arc<AppError>>,
    supported: SupportedParams,
    probe: Option<Arc<ConcurrencyProbe>>,
    /// Number of `fetch_jobs` calls.
    pub fetch_calls: Arc<AtomicUsize>,
    /// Number of `cleanup` calls.
    pub cleanup_calls: Arc<AtomicUsize>,
    /// Params received by each fetch, in call order.
    pub received: Arc<Mutex<Vec<FetchParams>>>,
}

impl MockSource {
    /// A healthy API source that returns no jobs.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source_type: SourceType::ApiAggregator,
            jobs: Vec::new(),
            fetch_error: None,
            panic_on_fetch: false,
            delay: Duration::ZERO,
            health: HealthBehavior::Status(HealthStatus::Healthy),
            init_error: None,
            cleanup_error: None,
            supported: SupportedParams::all(),
            probe: None,
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            cleanup_calls: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A source whose every fetch fails with `error`.
    pub fn failing(name: &str, error: AppError) -> Self {
        Self::new(name).with_error(error)
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobRecord>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_error(mut self, error: AppError) -> Self {
        self.fetch_error = Some(Arc::new(error));
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_fetch = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_health(mut self, status: HealthStatus) -> Self {
        self.health = HealthBehavior::Status(status);
        self
    }

    pub fn with_health_error(mut self, error: AppError) -> Self {
        self.health = HealthBehavior::Error(Arc::new(error));
        self
    }

    pub fn panicking_health(mut self) -> Self {
        self.health = HealthBehavior::Panic;
        self
    }

    pub fn with_init_error(mut self, error: AppError) -> Self {
        self.init_error = Some(Arc::new(error));
        self
    }

    pub fn with_cleanup_error(mut self, error: AppError) -> Self {
        self.cleanup_error = Some(Arc::new(error));
        self
    }

    pub fn with_supported_params(mut self, supported: SupportedParams) -> Self {
        self.supported = supported;
        self
    }

    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn fetch_jobs(&self, params: &FetchParams) -> Result<Vec<JobRecord>, AppError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(params.clone());

        if let Some(probe) = &self.probe {
            probe.enter();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(probe) = &self.probe {
            probe.exit();
        }

        if self.panic_on_fetch {
            panic!("mock source {} exploded", self.name);
        }
        match &self.fetch_error {
            Some(err) => Err(replay(err)),
            None => Ok(self.jobs.clone()),
        }
    }

    async fn health_check(&self) -> Result<HealthCheckResult, AppError> {
        match &self.health {
            HealthBehavior::Status(status) => {
                Ok(HealthCheckResult::new(*status, format!("{} is {status}", self.name))
                    .with_response_time(1))
            }
            HealthBehavior::Error(err) => Err(replay(err)),
            HealthBehavior::Panic => panic!("health probe for {} exploded", self.name),
        }
    }

    fn rate_limits(&self) -> RateLimitConfig {
        RateLimitConfig::default()
    }

    fn supported_params(&self) -> SupportedParams {
        self.supported.clone()
    }

    async fn initialize(&self) -> Result<(), AppError> {
        match &self.init_error {
            Some(err) => Err(replay(err)),
            None => Ok(()),
        }
    }

    async fn cleanup(&self) -> Result<(), AppError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        match &self.cleanup_error {
            Some(err) => Err(replay(err)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records a short label for each event it sees.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl AggregationReporter for MockReporter {
    fn report(&self, event: AggregationEvent<'_>) {
        let label = match event {
            AggregationEvent::RunStarted { candidates, .. } => {
                format!("run_started:{}", candidates.len())
            }
            AggregationEvent::SourceSkipped { source, .. } => format!("skipped:{source}"),
            AggregationEvent::SourceSucceeded { source, jobs, .. } => {
                format!("succeeded:{source}:{jobs}")
            }
            AggregationEvent::SourceFailed { source, failure } => {
                format!("failed:{source}:{}", failure.kind)
            }
            AggregationEvent::Deduplicated { removed, .. } => format!("deduplicated:{removed}"),
            AggregationEvent::RunFinished { result } => {
                format!("run_finished:{}", result.total_deduplicated)
            }
        };
        self.events.lock().unwrap().push(label);
    }
}
