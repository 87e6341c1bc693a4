use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::dedup::{Deduplicator, InMemoryDeduplicator};
use crate::enrichment::Enricher;
use crate::error::{AppError, FailureKind};
use crate::models::{
    AggregationResult, FetchParams, HealthStatus, JobRecord, RateLimitConfig, SourceFailure,
    SourceOutcome, SourceType, SupportedParams, elapsed_ms,
};
use crate::registry::{RegistryStats, SourceEntry, SourceRegistry};
use crate::reporter::{AggregationEvent, AggregationReporter, TracingAggregationReporter};
use crate::traits::JobSource;

/// Latest probe result for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// What a registered source declares about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    pub source_type: SourceType,
    pub enabled: bool,
    pub supported_params: SupportedParams,
    pub rate_limits: RateLimitConfig,
    pub health_status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub max_concurrent: usize,
    pub registry: RegistryStats,
    pub concurrency_slots_available: usize,
}

type FetchOutcome = (Result<Vec<JobRecord>, AppError>, u64);

/// Fans a search out to the registry's sources and merges what comes back.
///
/// The concurrency bound is shared by every call on the same orchestrator.
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    config: OrchestratorConfig,
    semaphore: Arc<Semaphore>,
    deduplicator: Arc<dyn Deduplicator>,
    enricher: Enricher,
    reporter: Arc<dyn AggregationReporter>,
}

impl Orchestrator {
    pub fn new(registry: Arc<SourceRegistry>, config: OrchestratorConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            enricher: Enricher::new(config.domain_keywords.clone()),
            deduplicator: Arc::new(InMemoryDeduplicator),
            reporter: Arc::new(TracingAggregationReporter),
            registry,
            config,
        })
    }

    pub fn with_deduplicator(mut self, deduplicator: Arc<dyn Deduplicator>) -> Self {
        self.deduplicator = deduplicator;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn AggregationReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one aggregation.
    ///
    /// With `source_names`, exactly those sources are considered (in the given
    /// order, enabled or not); otherwise every enabled source is. Sources with
    /// an unhealthy cached status are skipped unless `include_unhealthy`.
    ///
    /// Only an invalid `params` yields `Err`. Source failures are recorded in
    /// the result and never abort the run.
    pub async fn fetch_all_sources(
        &self,
        params: &FetchParams,
        source_names: Option<&[String]>,
        include_unhealthy: bool,
    ) -> Result<AggregationResult, AppError> {
        params.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut result = AggregationResult::empty(run_id, started_at);

        let candidates =
            self.resolve_candidates(source_names, include_unhealthy, &mut result.skipped_sources);
        for (source, reason) in &result.skipped_sources {
            self.reporter
                .report(AggregationEvent::SourceSkipped { source, reason });
        }

        let names: Vec<String> = candidates.iter().map(|e| e.name.clone()).collect();
        self.reporter.report(AggregationEvent::RunStarted {
            run_id,
            candidates: &names,
        });

        let outcomes = self.fan_out(candidates, params).await;

        let mut collected = Vec::new();
        for (name, outcome) in names.iter().zip(outcomes) {
            match outcome {
                Ok((Ok(jobs), elapsed)) => {
                    self.reporter.report(AggregationEvent::SourceSucceeded {
                        source: name,
                        jobs: jobs.len(),
                        elapsed_ms: elapsed,
                    });
                    result.per_source.insert(
                        name.clone(),
                        SourceOutcome {
                            success: true,
                            jobs_returned: jobs.len(),
                            elapsed_ms: elapsed,
                        },
                    );
                    result.successful_sources += 1;
                    collected.extend(jobs.into_iter().map(|job| stamp_source(job, name)));
                }
                Ok((Err(err), elapsed)) => {
                    self.record_failure(&mut result, name, SourceFailure::from(&err), elapsed);
                }
                Err(join_err) => {
                    let failure = SourceFailure {
                        kind: FailureKind::Other,
                        message: format!("Source task panicked: {join_err}"),
                        retry_after_secs: None,
                    };
                    self.record_failure(&mut result, name, failure, 0);
                }
            }
        }

        result.total_collected = collected.len();
        let deduplicated = self.deduplicator.deduplicate(collected);
        result.total_deduplicated = deduplicated.len();
        result.duplicates_removed = result.total_collected - result.total_deduplicated;
        self.reporter.report(AggregationEvent::Deduplicated {
            collected: result.total_collected,
            kept: result.total_deduplicated,
            removed: result.duplicates_removed,
        });

        result.jobs = self.enricher.enrich(&deduplicated);
        result.sources_queried = names;
        result.finished_at = Utc::now();
        result.duration_ms = elapsed_ms(started_at, result.finished_at);

        self.reporter
            .report(AggregationEvent::RunFinished { result: &result });
        Ok(result)
    }

    /// Aggregate from exactly `names`, skipping unhealthy ones.
    pub async fn fetch_from_sources(
        &self,
        names: &[String],
        params: &FetchParams,
    ) -> Result<AggregationResult, AppError> {
        self.fetch_all_sources(params, Some(names), false).await
    }

    /// Probe the named sources (all when `None`) and return fresh reports.
    pub async fn health_check_sources(
        &self,
        names: Option<&[String]>,
    ) -> BTreeMap<String, HealthReport> {
        self.registry
            .health_check(names)
            .await
            .into_iter()
            .map(|(name, r)| {
                let report = HealthReport {
                    status: r.status,
                    message: r.message,
                    response_time_ms: r.response_time_ms,
                    timestamp: r.timestamp,
                };
                (name, report)
            })
            .collect()
    }

    pub fn source_capabilities(&self) -> BTreeMap<String, SourceCapabilities> {
        self.registry
            .entries()
            .into_iter()
            .map(|entry| {
                let caps = SourceCapabilities {
                    source_type: entry.source.source_type(),
                    enabled: entry.enabled,
                    supported_params: entry.source.supported_params(),
                    rate_limits: entry.source.rate_limits(),
                    health_status: entry.health.status,
                };
                (entry.name, caps)
            })
            .collect()
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            max_concurrent: self.config.max_concurrent,
            registry: self.registry.stats(),
            concurrency_slots_available: self.semaphore.available_permits(),
        }
    }

    fn resolve_candidates(
        &self,
        source_names: Option<&[String]>,
        include_unhealthy: bool,
        skipped: &mut BTreeMap<String, String>,
    ) -> Vec<SourceEntry> {
        let entries: Vec<SourceEntry> = match source_names {
            Some(names) => {
                let mut seen = HashSet::new();
                names
                    .iter()
                    .filter(|name| seen.insert(name.as_str()))
                    .filter_map(|name| {
                        let entry = self.registry.entry(name);
                        if entry.is_none() {
                            skipped.insert(name.clone(), "not registered".into());
                        }
                        entry
                    })
                    .collect()
            }
            None => self
                .registry
                .entries()
                .into_iter()
                .filter(|entry| {
                    if !entry.enabled {
                        skipped.insert(entry.name.clone(), "disabled".into());
                    }
                    entry.enabled
                })
                .collect(),
        };

        if include_unhealthy {
            return entries;
        }
        entries
            .into_iter()
            .filter(|entry| {
                let eligible = entry.health.status.is_eligible();
                if !eligible {
                    skipped.insert(
                        entry.name.clone(),
                        format!("unhealthy: {}", entry.health.message),
                    );
                }
                eligible
            })
            .collect()
    }

    /// One task per candidate, each waiting for a permit before fetching.
    /// Outcomes come back in candidate order.
    async fn fan_out(
        &self,
        candidates: Vec<SourceEntry>,
        params: &FetchParams,
    ) -> Vec<Result<FetchOutcome, tokio::task::JoinError>> {
        let params = Arc::new(params.clone());
        let handles: Vec<_> = candidates
            .into_iter()
            .map(|entry| {
                let semaphore = Arc::clone(&self.semaphore);
                let params = Arc::clone(&params);
                let timeout = self.config.fetch_timeout;
                tokio::spawn(fetch_one(entry.source, semaphore, params, timeout))
            })
            .collect();

        futures::future::join_all(handles).await
    }

    fn record_failure(
        &self,
        result: &mut AggregationResult,
        name: &str,
        failure: SourceFailure,
        elapsed: u64,
    ) {
        self.reporter.report(AggregationEvent::SourceFailed {
            source: name,
            failure: &failure,
        });
        result.per_source.insert(
            name.to_string(),
            SourceOutcome {
                success: false,
                jobs_returned: 0,
                elapsed_ms: elapsed,
            },
        );
        result.errors.insert(name.to_string(), failure);
        result.failed_sources += 1;
    }
}

async fn fetch_one(
    source: Arc<dyn JobSource>,
    semaphore: Arc<Semaphore>,
    params: Arc<FetchParams>,
    timeout: Option<Duration>,
) -> FetchOutcome {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                Err(AppError::Generic("concurrency limiter closed".into())),
                0,
            );
        }
    };

    let started = Instant::now();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, source.fetch_jobs(&params)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(limit.as_secs_f64().ceil() as u64)),
        },
        None => source.fetch_jobs(&params).await,
    };
    (result, started.elapsed().as_millis() as u64)
}

/// Records must name their origin; fill it in for sources that leave it blank.
fn stamp_source(mut job: JobRecord, source: &str) -> JobRecord {
    if job.source.trim().is_empty() {
        job.source = source.to_string();
    }
    job
}
