//! Authoritative set of job sources with their enabled flag and cached health.
//!
//! Every operation is infallible: unknown names come back as `false` / `None`.
//! State sits behind a single mutex that is never held across an `.await`, so
//! the registry can be shared freely between concurrent aggregation runs and
//! health sweeps.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{HealthCheckResult, HealthStatus, SourceType};
use crate::traits::JobSource;

struct RegisteredSource {
    source: Arc<dyn JobSource>,
    enabled: bool,
    config: Option<serde_json::Value>,
    health: HealthCheckResult,
    registered_at: DateTime<Utc>,
}

/// Point-in-time view of one registry entry.
#[derive(Clone)]
pub struct SourceEntry {
    pub name: String,
    pub source: Arc<dyn JobSource>,
    pub enabled: bool,
    pub config: Option<serde_json::Value>,
    pub health: HealthCheckResult,
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceEntry")
            .field("name", &self.name)
            .field("source_type", &self.source.source_type())
            .field("enabled", &self.enabled)
            .field("health", &self.health.status)
            .finish()
    }
}

/// Registry-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub by_type: BTreeMap<String, usize>,
    pub health_distribution: BTreeMap<String, usize>,
}

#[derive(Default)]
pub struct SourceRegistry {
    sources: Mutex<HashMap<String, RegisteredSource>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        f.debug_struct("SourceRegistry")
            .field("sources", &names)
            .finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the registry lock, recovering from poison if necessary.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RegisteredSource>> {
        self.sources.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned registry mutex");
            poisoned.into_inner()
        })
    }

    /// Register a source under its own name. Always succeeds.
    ///
    /// An existing entry with the same name is replaced (without running its
    /// cleanup). Cached health starts out as `unknown` and the source is enabled.
    pub fn register(
        &self,
        source: Arc<dyn JobSource>,
        config: Option<serde_json::Value>,
    ) -> bool {
        let name = source.name().to_string();
        let source_type = source.source_type();
        let entry = RegisteredSource {
            source,
            enabled: true,
            config,
            health: HealthCheckResult::unknown(),
            registered_at: Utc::now(),
        };

        let replaced = self.lock().insert(name.clone(), entry).is_some();
        if replaced {
            tracing::warn!(source = %name, "Replacing already registered source");
        } else {
            tracing::info!(source = %name, %source_type, "Registered source");
        }
        true
    }

    /// Remove a source and run its cleanup. Returns `false` if it was not registered.
    ///
    /// Cleanup errors are logged and swallowed.
    pub async fn unregister(&self, name: &str) -> bool {
        let Some(entry) = self.lock().remove(name) else {
            return false;
        };

        if let Err(e) = entry.source.cleanup().await {
            tracing::warn!(source = %name, error = %e, "Source cleanup failed");
        }
        tracing::info!(source = %name, "Unregistered source");
        true
    }

    /// Unregister every source, running each cleanup.
    pub async fn shutdown(&self) -> usize {
        let names = self.list(None, false);
        let mut removed = 0;
        for name in &names {
            if self.unregister(name).await {
                removed += 1;
            }
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobSource>> {
        self.lock().get(name).map(|e| Arc::clone(&e.source))
    }

    pub fn entry(&self, name: &str) -> Option<SourceEntry> {
        self.lock().get(name).map(|e| to_entry(name, e))
    }

    /// Snapshot of every entry, sorted by name.
    pub fn entries(&self) -> Vec<SourceEntry> {
        let sources = self.lock();
        let mut entries: Vec<_> = sources.iter().map(|(n, e)| to_entry(n, e)).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered names, optionally filtered, sorted by name.
    pub fn list(&self, source_type: Option<SourceType>, enabled_only: bool) -> Vec<String> {
        let sources = self.lock();
        let mut names: Vec<String> = sources
            .iter()
            .filter(|(_, e)| source_type.is_none_or(|t| e.source.source_type() == t))
            .filter(|(_, e)| !enabled_only || e.enabled)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.lock().get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                tracing::info!(source = %name, %enabled, "Source toggled");
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.lock().get(name).map(|e| e.enabled)
    }

    pub fn update_config(&self, name: &str, config: serde_json::Value) -> bool {
        match self.lock().get_mut(name) {
            Some(entry) => {
                entry.config = Some(config);
                true
            }
            None => false,
        }
    }

    pub fn config(&self, name: &str) -> Option<serde_json::Value> {
        self.lock().get(name).and_then(|e| e.config.clone())
    }

    pub fn health_status(&self, name: &str) -> Option<HealthStatus> {
        self.lock().get(name).map(|e| e.health.status)
    }

    pub fn cached_health(&self, name: &str) -> Option<HealthCheckResult> {
        self.lock().get(name).map(|e| e.health.clone())
    }

    /// Probe every registered source concurrently and cache the results.
    ///
    /// A probe that errors or panics marks its source unhealthy; nothing escapes.
    pub async fn health_check_all(&self) -> BTreeMap<String, HealthStatus> {
        let targets = self.targets(None);
        self.probe(targets)
            .await
            .into_iter()
            .map(|(name, result)| (name, result.status))
            .collect()
    }

    /// Probe the named sources (all of them when `None`). Unknown names are skipped.
    pub async fn health_check(
        &self,
        names: Option<&[String]>,
    ) -> BTreeMap<String, HealthCheckResult> {
        let targets = self.targets(names);
        self.probe(targets).await
    }

    /// Run every source's `initialize`. A failure caches an unhealthy result so
    /// health-aware selection skips the source until it is probed again.
    pub async fn initialize_all(&self) -> BTreeMap<String, bool> {
        let targets = self.targets(None);
        let tasks = targets.into_iter().map(|(name, source)| {
            let handle = tokio::spawn({
                let source = Arc::clone(&source);
                async move { source.initialize().await }
            });
            async move { (name, source, handle.await) }
        });

        let mut outcomes = BTreeMap::new();
        for (name, source, joined) in futures::future::join_all(tasks).await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("Initialization failed: {e}")),
                Err(e) => Some(format!("Initialization panicked: {e}")),
            };
            match failure {
                None => {
                    outcomes.insert(name, true);
                }
                Some(message) => {
                    tracing::warn!(source = %name, error = %message, "Source failed to initialize");
                    self.cache_health(&name, &source, HealthCheckResult::unhealthy(message));
                    outcomes.insert(name, false);
                }
            }
        }
        outcomes
    }

    pub fn stats(&self) -> RegistryStats {
        let sources = self.lock();
        let mut stats = RegistryStats {
            total: sources.len(),
            ..Default::default()
        };
        for entry in sources.values() {
            if entry.enabled {
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
            *stats
                .by_type
                .entry(entry.source.source_type().to_string())
                .or_default() += 1;
            *stats
                .health_distribution
                .entry(entry.health.status.to_string())
                .or_default() += 1;
        }
        stats
    }

    fn targets(&self, names: Option<&[String]>) -> Vec<(String, Arc<dyn JobSource>)> {
        let sources = self.lock();
        let mut targets: Vec<_> = match names {
            Some(names) => names
                .iter()
                .filter_map(|n| sources.get(n).map(|e| (n.clone(), Arc::clone(&e.source))))
                .collect(),
            None => sources
                .iter()
                .map(|(n, e)| (n.clone(), Arc::clone(&e.source)))
                .collect(),
        };
        targets.sort_by(|a, b| a.0.cmp(&b.0));
        targets.dedup_by(|a, b| a.0 == b.0);
        targets
    }

    async fn probe(
        &self,
        targets: Vec<(String, Arc<dyn JobSource>)>,
    ) -> BTreeMap<String, HealthCheckResult> {
        let tasks = targets.into_iter().map(|(name, source)| {
            let handle = tokio::spawn({
                let source = Arc::clone(&source);
                async move {
                    let started = Instant::now();
                    let result = source.health_check().await;
                    (result, started.elapsed().as_millis() as u64)
                }
            });
            async move { (name, source, handle.await) }
        });

        let mut results = BTreeMap::new();
        for (name, source, joined) in futures::future::join_all(tasks).await {
            let result = match joined {
                Ok((Ok(mut result), elapsed_ms)) => {
                    if result.response_time_ms == 0 {
                        result.response_time_ms = elapsed_ms;
                    }
                    result
                }
                Ok((Err(e), elapsed_ms)) => {
                    tracing::warn!(source = %name, error = %e, "Health check failed");
                    HealthCheckResult::unhealthy(format!("Health check failed: {e}"))
                        .with_response_time(elapsed_ms)
                }
                Err(e) => {
                    tracing::error!(source = %name, error = %e, "Health check panicked");
                    HealthCheckResult::unhealthy(format!("Health check panicked: {e}"))
                }
            };
            self.cache_health(&name, &source, result.clone());
            results.insert(name, result);
        }
        results
    }

    /// Store a probe result, unless the entry was replaced while the probe ran.
    fn cache_health(&self, name: &str, source: &Arc<dyn JobSource>, result: HealthCheckResult) {
        if let Some(entry) = self.lock().get_mut(name)
            && Arc::ptr_eq(&entry.source, source)
        {
            entry.health = result;
        }
    }
}

fn to_entry(name: &str, e: &RegisteredSource) -> SourceEntry {
    SourceEntry {
        name: name.to_string(),
        source: Arc::clone(&e.source),
        enabled: e.enabled,
        config: e.config.clone(),
        health: e.health.clone(),
        registered_at: e.registered_at,
    }
}
