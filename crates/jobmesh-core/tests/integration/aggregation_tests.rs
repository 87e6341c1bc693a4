use std::sync::Arc;
use std::time::Duration;

use jobmesh_core::testutil::{ConcurrencyProbe, MockSource, job, job_without_url};
use jobmesh_core::{
    AppError, CachedDeduplicator, FailureKind, FetchParams, HealthStatus, JobLevel,
    OrchestratorConfig,
};

use crate::common::{names, orchestrator_with, orchestrator_with_config, pm_search};

#[tokio::test]
async fn zero_sources_yield_valid_empty_result() {
    let orch = orchestrator_with(vec![]);

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert!(result.jobs.is_empty());
    assert!(result.sources_queried.is_empty());
    assert_eq!(result.successful_sources, 0);
    assert_eq!(result.failed_sources, 0);
    assert_eq!(result.total_collected, 0);
    assert_eq!(result.duplicates_removed, 0);
    assert!(result.errors.is_empty());
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn two_sources_with_one_shared_posting() {
    let shared_url = "https://jobs.example.com/tpm-42";
    let a = MockSource::new("A").with_jobs(vec![
        job("A", "1", "Senior Technical Product Manager", "Acme").with_url(shared_url),
        job("A", "2", "Associate Product Manager", "Beta"),
    ]);
    let b = MockSource::new("B").with_jobs(vec![
        job("B", "77", "TPM, Platform", "Acme Corp").with_url(shared_url),
    ]);
    let orch = orchestrator_with(vec![a, b]);

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(result.total_collected, 3);
    assert_eq!(result.total_deduplicated, 2);
    assert_eq!(result.duplicates_removed, 1);
    assert_eq!(result.successful_sources, 2);
    assert!(result.jobs.iter().all(|j| j.job.source == "A"));
    assert_eq!(result.jobs[0].job_type, JobLevel::Senior);
    assert_eq!(result.jobs[1].job_type, JobLevel::Entry);
    assert_eq!(result.per_source["B"].jobs_returned, 1);
}

#[tokio::test]
async fn reference_scenario_counts() {
    let a = MockSource::new("A")
        .with_jobs(vec![job_without_url("A", "1", "PM", "Acme").with_url("http://x/1")]);
    let b = MockSource::new("B").with_jobs(vec![
        job_without_url("B", "1", "PM", "Acme").with_url("http://x/1"),
        job_without_url("B", "2", "Eng", "Acme").with_url("http://x/2"),
    ]);
    let orch = orchestrator_with(vec![a, b]);

    let result = orch
        .fetch_all_sources(&FetchParams::new(["pm"]), None, false)
        .await
        .unwrap();

    assert_eq!(result.total_collected, 3);
    assert_eq!(result.total_deduplicated, 2);
    assert_eq!(result.duplicates_removed, 1);
    assert_eq!(result.jobs[0].job.url.as_deref(), Some("http://x/1"));
    assert_eq!(result.jobs[0].job.source, "A");
    assert_eq!(result.jobs[1].job.url.as_deref(), Some("http://x/2"));
}

#[tokio::test]
async fn failing_sources_do_not_affect_others() {
    let orch = orchestrator_with(vec![
        MockSource::new("ok-1").with_jobs(vec![job("ok-1", "1", "PM", "Acme")]),
        MockSource::failing("down", AppError::SourceUnavailable("503".into())),
        MockSource::new("ok-2").with_jobs(vec![job("ok-2", "1", "TPM", "Beta")]),
        MockSource::failing(
            "throttled",
            AppError::RateLimited {
                retry_after: Some(Duration::from_secs(90)),
            },
        ),
    ]);

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(result.sources_queried.len(), 4);
    assert_eq!(result.successful_sources, 2);
    assert_eq!(result.failed_sources, 2);
    assert_eq!(
        result.sources_queried.len(),
        result.successful_sources + result.failed_sources
    );
    assert_eq!(result.total_deduplicated, 2);

    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors["down"].kind, FailureKind::SourceUnavailable);
    assert_eq!(result.errors["throttled"].kind, FailureKind::RateLimited);
    assert_eq!(result.errors["throttled"].retry_after_secs, Some(90));
    assert!(!result.per_source["down"].success);
    assert!(result.per_source["ok-2"].success);
}

#[tokio::test]
async fn panicking_source_is_recorded_as_failure() {
    let orch = orchestrator_with(vec![
        MockSource::new("good").with_jobs(vec![job("good", "1", "PM", "Acme")]),
        MockSource::new("bomb").panicking(),
    ]);

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(result.successful_sources, 1);
    assert_eq!(result.failed_sources, 1);
    assert_eq!(result.errors["bomb"].kind, FailureKind::Other);
    assert!(result.errors["bomb"].message.contains("panicked"));
    assert_eq!(result.jobs.len(), 1);
}

#[tokio::test]
async fn invalid_params_fail_before_any_fetch() {
    let source = MockSource::new("a").with_jobs(vec![job("a", "1", "PM", "Acme")]);
    let calls = source.fetch_calls.clone();
    let orch = orchestrator_with(vec![source]);

    for params in [
        FetchParams::new(["   "]),
        FetchParams::new(["pm"]).with_limit(0),
        FetchParams::new(["pm"]).with_date_range_days(0),
    ] {
        let err = orch
            .fetch_all_sources(&params, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailure(_)));
    }

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unhealthy_sources_skipped_unless_included() {
    let orch = orchestrator_with(vec![
        MockSource::new("fine").with_jobs(vec![job("fine", "1", "PM", "Acme")]),
        MockSource::new("sick")
            .with_jobs(vec![job("sick", "1", "TPM", "Beta")])
            .with_health(HealthStatus::Unhealthy),
        MockSource::new("meh")
            .with_jobs(vec![job("meh", "1", "Designer", "Gamma")])
            .with_health(HealthStatus::Degraded),
    ]);
    orch.registry().health_check_all().await;

    let filtered = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();
    assert_eq!(filtered.sources_queried, vec!["fine", "meh"]);
    assert!(filtered.skipped_sources["sick"].starts_with("unhealthy"));

    let everything = orch
        .fetch_all_sources(&pm_search(), None, true)
        .await
        .unwrap();
    assert_eq!(everything.sources_queried, vec!["fine", "meh", "sick"]);
    assert_eq!(everything.total_deduplicated, 3);
}

#[tokio::test]
async fn fetch_from_sources_applies_health_filter() {
    let orch = orchestrator_with(vec![
        MockSource::new("a"),
        MockSource::new("b").with_health_error(AppError::SourceUnavailable("gone".into())),
    ]);
    orch.registry().health_check_all().await;

    let result = orch
        .fetch_from_sources(&names(&["a", "b"]), &pm_search())
        .await
        .unwrap();

    assert_eq!(result.sources_queried, vec!["a"]);
    assert!(result.skipped_sources.contains_key("b"));
}

#[tokio::test]
async fn concurrency_never_exceeds_bound() {
    let probe = ConcurrencyProbe::new();
    let sources = (0..6)
        .map(|i| {
            MockSource::new(&format!("s{i}"))
                .with_delay(Duration::from_millis(40))
                .with_probe(Arc::clone(&probe))
        })
        .collect();
    let orch = orchestrator_with_config(
        sources,
        OrchestratorConfig::default().with_max_concurrent(2),
    );

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(result.successful_sources, 6);
    assert!(probe.peak() <= 2, "peak was {}", probe.peak());
    assert!(probe.peak() >= 1);
    assert_eq!(orch.stats().concurrency_slots_available, 2);
}

#[tokio::test]
async fn slow_source_times_out_as_unavailable() {
    let orch = orchestrator_with_config(
        vec![
            MockSource::new("fast").with_jobs(vec![job("fast", "1", "PM", "Acme")]),
            MockSource::new("slow")
                .with_jobs(vec![job("slow", "1", "TPM", "Beta")])
                .with_delay(Duration::from_secs(10)),
        ],
        OrchestratorConfig::default().with_fetch_timeout(Duration::from_millis(100)),
    );

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(result.successful_sources, 1);
    assert_eq!(result.errors["slow"].kind, FailureKind::SourceUnavailable);
    assert!(result.errors["slow"].message.contains("timed out"));
}

#[tokio::test]
async fn merge_follows_candidate_order() {
    // "a" finishes last but its posting still wins the tie.
    let orch = orchestrator_with(vec![
        MockSource::new("a")
            .with_jobs(vec![job_without_url("a", "1", "PM", "Acme")])
            .with_delay(Duration::from_millis(60)),
        MockSource::new("b").with_jobs(vec![job_without_url("b", "1", "pm", "ACME")]),
    ]);

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(result.jobs.len(), 1);
    assert_eq!(result.jobs[0].job.source, "a");
}

#[tokio::test]
async fn params_reach_sources_unchanged() {
    let source = MockSource::new("a");
    let received = source.received.clone();
    let orch = orchestrator_with(vec![source]);
    let params = FetchParams::new(["tpm"])
        .with_company("Acme")
        .with_offset(20)
        .with_extra("country", serde_json::json!("de"));

    orch.fetch_all_sources(&params, None, false).await.unwrap();

    assert_eq!(received.lock().unwrap().as_slice(), &[params]);
}

#[tokio::test]
async fn cached_deduplicator_drops_repeat_postings_across_runs() {
    let orch = orchestrator_with(vec![
        MockSource::new("a").with_jobs(vec![job("a", "1", "PM", "Acme")]),
    ])
    .with_deduplicator(Arc::new(CachedDeduplicator::new(
        Duration::from_secs(60),
        1_000,
    )));

    let first = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();
    let second = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();

    assert_eq!(first.total_deduplicated, 1);
    assert_eq!(second.total_collected, 1);
    assert_eq!(second.total_deduplicated, 0);
    assert_eq!(second.duplicates_removed, 1);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn result_serializes_for_downstream_consumers() {
    let orch = orchestrator_with(vec![
        MockSource::new("a").with_jobs(vec![job("a", "1", "Remote PM", "Acme")]),
        MockSource::failing("b", AppError::AuthenticationFailure("bad key".into())),
    ]);

    let result = orch
        .fetch_all_sources(&pm_search(), None, false)
        .await
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["jobs"][0]["source"], "a");
    assert_eq!(json["jobs"][0]["remote_friendly"], true);
    assert_eq!(json["errors"]["b"]["kind"], "authentication_failure");
    assert_eq!(json["sources_queried"], serde_json::json!(["a", "b"]));
}
