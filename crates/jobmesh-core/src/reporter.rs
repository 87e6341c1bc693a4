use uuid::Uuid;

use crate::models::{AggregationResult, SourceFailure};

/// Events emitted by the orchestrator during an aggregation run.
#[derive(Debug, Clone)]
pub enum AggregationEvent<'a> {
    RunStarted {
        run_id: Uuid,
        candidates: &'a [String],
    },
    SourceSkipped {
        source: &'a str,
        reason: &'a str,
    },
    SourceSucceeded {
        source: &'a str,
        jobs: usize,
        elapsed_ms: u64,
    },
    SourceFailed {
        source: &'a str,
        failure: &'a SourceFailure,
    },
    Deduplicated {
        collected: usize,
        kept: usize,
        removed: usize,
    },
    RunFinished {
        result: &'a AggregationResult,
    },
}

/// Receives aggregation events (decoupled logging).
pub trait AggregationReporter: Send + Sync {
    fn report(&self, event: AggregationEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAggregationReporter;

impl AggregationReporter for TracingAggregationReporter {
    fn report(&self, event: AggregationEvent<'_>) {
        match event {
            AggregationEvent::RunStarted { run_id, candidates } => {
                tracing::info!(%run_id, sources = candidates.len(), "Aggregation started");
            }
            AggregationEvent::SourceSkipped { source, reason } => {
                tracing::warn!(%source, %reason, "Source skipped");
            }
            AggregationEvent::SourceSucceeded {
                source,
                jobs,
                elapsed_ms,
            } => {
                tracing::info!(%source, %jobs, %elapsed_ms, "Source fetched");
            }
            AggregationEvent::SourceFailed { source, failure } => {
                tracing::warn!(
                    %source,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Source failed"
                );
            }
            AggregationEvent::Deduplicated {
                collected,
                kept,
                removed,
            } => {
                tracing::debug!(%collected, %kept, %removed, "Deduplicated");
            }
            AggregationEvent::RunFinished { result } => {
                tracing::info!(
                    run_id = %result.run_id,
                    jobs = result.total_deduplicated,
                    successful = result.successful_sources,
                    failed = result.failed_sources,
                    duration_ms = result.duration_ms,
                    "Aggregation finished"
                );
            }
        }
    }
}

