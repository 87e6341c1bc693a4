//! Duplicate removal across sources.
//!
//! A record is a duplicate when its non-empty URL was already seen, or when its
//! lower-cased `(title, company)` pair was. The first occurrence wins, so the
//! input order decides which copy survives.

use std::collections::HashSet;
use std::time::Duration;

use moka::sync::Cache;

use crate::models::{JobRecord, compute_hash};

/// Strategy for removing duplicate postings from a merged list.
pub trait Deduplicator: Send + Sync {
    /// Returns the survivors in their original relative order.
    fn deduplicate(&self, jobs: Vec<JobRecord>) -> Vec<JobRecord>;
}

/// Single-pass dedup with no memory between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryDeduplicator;

impl Deduplicator for InMemoryDeduplicator {
    fn deduplicate(&self, jobs: Vec<JobRecord>) -> Vec<JobRecord> {
        deduplicate(jobs)
    }
}

pub fn deduplicate(jobs: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

    jobs.into_iter()
        .filter(|job| {
            let pair = job.pair_identity();
            let url_seen = job.url_identity().is_some_and(|u| seen_urls.contains(u));
            if url_seen || seen_pairs.contains(&pair) {
                return false;
            }
            if let Some(url) = job.url_identity() {
                seen_urls.insert(url.to_string());
            }
            seen_pairs.insert(pair);
            true
        })
        .collect()
}

/// Cross-run dedup: same rules as [`InMemoryDeduplicator`], plus postings
/// returned by an earlier run within `ttl` are dropped too.
///
/// Identities are remembered as SHA-256 fingerprints.
#[derive(Clone)]
pub struct CachedDeduplicator {
    seen: Cache<String, ()>,
}

impl CachedDeduplicator {
    pub const DEFAULT_CAPACITY: u64 = 100_000;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Forget everything seen so far.
    pub fn clear(&self) {
        self.seen.invalidate_all();
    }

    fn fingerprints(job: &JobRecord) -> Vec<String> {
        let (title, company) = job.pair_identity();
        let mut prints = vec![compute_hash(&format!("pair:{title}\u{1f}{company}"))];
        if let Some(url) = job.url_identity() {
            prints.push(compute_hash(&format!("url:{url}")));
        }
        prints
    }
}

impl Default for CachedDeduplicator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::DEFAULT_CAPACITY)
    }
}

impl Deduplicator for CachedDeduplicator {
    fn deduplicate(&self, jobs: Vec<JobRecord>) -> Vec<JobRecord> {
        let survivors: Vec<JobRecord> = deduplicate(jobs)
            .into_iter()
            .filter(|job| {
                !Self::fingerprints(job)
                    .iter()
                    .any(|p| self.seen.contains_key(p))
            })
            .collect();

        for job in &survivors {
            for print in Self::fingerprints(job) {
                self.seen.insert(print, ());
            }
        }
        survivors
    }
}
