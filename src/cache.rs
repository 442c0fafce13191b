//! Analysis cache: a bounded, time-limited store of pipeline contexts.
//!
//! One entry per in-flight analysis, keyed by the opaque analysis id. A
//! partial run stays retryable until its entry expires (30 minutes); after
//! that the id is simply not found and a retry must start fresh. Entries
//! are evicted eagerly on completion.
//!
//! The entry for a given id is logically exclusive: callers must serialize
//! retries per id themselves; concurrent retries of one analysis are
//! undefined behavior.

use std::time::Duration;

use uuid::Uuid;

use crate::config;
use crate::context::PipelineContext;

pub struct AnalysisCache {
    inner: moka::sync::Cache<Uuid, PipelineContext>,
}

impl AnalysisCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = moka::sync::Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    pub fn with_defaults() -> Self {
        Self::new(config::ANALYSIS_CACHE_MAX_ENTRIES, config::ANALYSIS_CACHE_TTL)
    }

    /// Persist the current context state, replacing any previous snapshot.
    pub fn put(&self, ctx: &PipelineContext) {
        self.inner.insert(ctx.analysis_id, ctx.clone());
    }

    pub fn get(&self, analysis_id: &Uuid) -> Option<PipelineContext> {
        self.inner.get(analysis_id)
    }

    pub fn contains(&self, analysis_id: &Uuid) -> bool {
        self.inner.get(analysis_id).is_some()
    }

    pub fn evict(&self, analysis_id: &Uuid) {
        self.inner.invalidate(analysis_id);
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
