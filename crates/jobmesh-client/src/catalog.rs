//! JSON source catalog.
//!
//! ```json
//! [
//!   {"kind": "http_feed", "name": "remote-feed", "endpoint": "https://feed.example.com/jobs"},
//!   {"kind": "file", "name": "export", "path": "jobs.json", "enabled": false}
//! ]
//! ```
//!
//! Relative file paths resolve against the catalog's own directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use jobmesh_core::{AppError, JobSource, SourceRegistry};

use crate::file_source::{FileSource, FileSourceConfig};
use crate::http_feed::{FeedSourceConfig, HttpFeedSource};

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    HttpFeed(FeedSourceConfig),
    File(FileSourceConfig),
}

impl SourceSpec {
    pub fn name(&self) -> &str {
        match self {
            SourceSpec::HttpFeed(c) => &c.name,
            SourceSpec::File(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub source: SourceSpec,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Opaque per-source settings, stored on the registry entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceCatalog {
    pub entries: Vec<CatalogEntry>,
    base_dir: Option<PathBuf>,
}

impl SourceCatalog {
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self {
            entries,
            base_dir: None,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Cannot read catalog {}: {e}", path.display()))
        })?;
        let mut catalog = Self::from_json(&contents)?;
        catalog.base_dir = path.parent().map(Path::to_path_buf);
        Ok(catalog)
    }

    /// Instantiate a source for every entry.
    pub fn build_sources(&self) -> Result<Vec<(Arc<dyn JobSource>, &CatalogEntry)>, AppError> {
        self.entries
            .iter()
            .map(|entry| {
                let source: Arc<dyn JobSource> = match &entry.source {
                    SourceSpec::HttpFeed(config) => Arc::new(HttpFeedSource::new(config.clone())?),
                    SourceSpec::File(config) => {
                        let mut config = config.clone();
                        if let Some(base) = &self.base_dir
                            && config.path.is_relative()
                        {
                            config.path = base.join(&config.path);
                        }
                        Arc::new(FileSource::new(config))
                    }
                };
                Ok((source, entry))
            })
            .collect()
    }

    /// Register every entry, disabling those marked `"enabled": false`.
    ///
    /// Nothing is registered if any entry fails to build.
    pub fn register_into(&self, registry: &SourceRegistry) -> Result<usize, AppError> {
        let sources = self.build_sources()?;
        let count = sources.len();
        for (source, entry) in sources {
            let name = entry.source.name().to_string();
            registry.register(source, entry.config.clone());
            if !entry.enabled {
                registry.disable(&name);
            }
        }
        tracing::info!(sources = count, "Catalog loaded");
        Ok(count)
    }

    pub fn build_registry(&self) -> Result<SourceRegistry, AppError> {
        let registry = SourceRegistry::new();
        self.register_into(&registry)?;
        Ok(registry)
    }
}
