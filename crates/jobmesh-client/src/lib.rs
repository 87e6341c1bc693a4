pub mod catalog;
pub mod file_source;
pub mod http_feed;
pub mod mapping;

pub use catalog::{CatalogEntry, SourceCatalog, SourceSpec};
pub use file_source::{FileSource, FileSourceConfig};
pub use http_feed::{FeedSourceConfig, HttpFeedSource};
