use std::sync::Arc;

use jobmesh_core::testutil::MockSource;
use jobmesh_core::{AppError, HealthStatus, SourceType};

use crate::common::{names, orchestrator_with, registry_with};

#[tokio::test]
async fn health_sweep_covers_every_source() {
    let registry = registry_with(vec![
        MockSource::new("api").with_health(HealthStatus::Healthy),
        MockSource::new("scraper")
            .with_source_type(SourceType::BrowserScraper)
            .with_health_error(AppError::Timeout(30)),
        MockSource::new("flaky").panicking_health(),
    ]);

    let statuses = registry.health_check_all().await;

    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses["api"], HealthStatus::Healthy);
    assert_eq!(statuses["scraper"], HealthStatus::Unhealthy);
    assert_eq!(statuses["flaky"], HealthStatus::Unhealthy);
    assert_eq!(registry.stats().health_distribution["unhealthy"], 2);
}

#[tokio::test]
async fn health_reports_through_orchestrator() {
    let orch = orchestrator_with(vec![
        MockSource::new("a"),
        MockSource::new("b").with_health(HealthStatus::Degraded),
    ]);

    let reports = orch
        .health_check_sources(Some(names(&["b", "nope"]).as_slice()))
        .await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports["b"].status, HealthStatus::Degraded);
    assert_eq!(
        orch.source_capabilities()["b"].health_status,
        HealthStatus::Degraded
    );
    assert_eq!(
        orch.source_capabilities()["a"].health_status,
        HealthStatus::Unknown
    );
}

#[tokio::test]
async fn re_registration_replaces_entry() {
    let registry = registry_with(vec![MockSource::new("dup").with_health(HealthStatus::Unhealthy)]);
    registry.health_check_all().await;

    let replacement = MockSource::new("dup").with_source_type(SourceType::BrowserScraper);
    assert!(registry.register(Arc::new(replacement), None));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.health_status("dup"), Some(HealthStatus::Unknown));
    assert_eq!(
        registry.get("dup").unwrap().source_type(),
        SourceType::BrowserScraper
    );
}

#[tokio::test]
async fn failed_initialize_keeps_source_out_of_runs() {
    let orch = orchestrator_with(vec![
        MockSource::new("ready"),
        MockSource::new("locked")
            .with_init_error(AppError::AuthenticationFailure("missing token".into())),
    ]);

    let outcomes = orch.registry().initialize_all().await;
    assert!(outcomes["ready"]);
    assert!(!outcomes["locked"]);

    let result = orch
        .fetch_all_sources(&crate::common::pm_search(), None, false)
        .await
        .unwrap();
    assert_eq!(result.sources_queried, vec!["ready"]);
    assert!(result.skipped_sources["locked"].contains("missing token"));
}

#[tokio::test]
async fn shutdown_runs_cleanup_for_all() {
    let a = MockSource::new("a");
    let b = MockSource::new("b").with_cleanup_error(AppError::Generic("stuck".into()));
    let (a_calls, b_calls) = (a.cleanup_calls.clone(), b.cleanup_calls.clone());
    let registry = registry_with(vec![a, b]);

    assert_eq!(registry.shutdown().await, 2);
    assert!(registry.is_empty());
    assert_eq!(a_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}
