pub mod config;
pub mod dedup;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod reporter;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
pub mod traits;

pub use config::OrchestratorConfig;
pub use dedup::{CachedDeduplicator, Deduplicator, InMemoryDeduplicator};
pub use enrichment::{DEFAULT_DOMAIN_KEYWORDS, Enricher};
pub use error::{AppError, FailureKind};
pub use models::{
    AggregatedJob, AggregationResult, FetchParams, HealthCheckResult, HealthStatus, JobLevel,
    JobRecord, RateLimitConfig, SourceFailure, SourceOutcome, SourceType, SupportedParams,
    compute_hash,
};
pub use orchestrator::{HealthReport, Orchestrator, OrchestratorStats, SourceCapabilities};
pub use registry::{RegistryStats, SourceEntry, SourceRegistry};
pub use reporter::{AggregationEvent, AggregationReporter, TracingAggregationReporter};
pub use traits::JobSource;
