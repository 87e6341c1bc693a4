use std::sync::Arc;

use jobmesh_core::testutil::MockSource;
use jobmesh_core::{FetchParams, Orchestrator, OrchestratorConfig, SourceRegistry};

pub fn registry_with(sources: Vec<MockSource>) -> Arc<SourceRegistry> {
    let registry = Arc::new(SourceRegistry::new());
    for source in sources {
        registry.register(Arc::new(source), None);
    }
    registry
}

pub fn orchestrator_with(sources: Vec<MockSource>) -> Orchestrator {
    orchestrator_with_config(sources, OrchestratorConfig::default())
}

pub fn orchestrator_with_config(
    sources: Vec<MockSource>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(registry_with(sources), config).expect("valid config")
}

pub fn pm_search() -> FetchParams {
    FetchParams::new(["product manager"]).with_location("Remote")
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
