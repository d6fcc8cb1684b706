//! Memoized resolution results.
//!
//! Resolution is deterministic for a given request fingerprint, so
//! successful results are safe to reuse. Entries live in a bounded,
//! TTL-evicting cache keyed by the request fingerprint; failures are never
//! memoized, so a retry after the author edits the message re-runs the
//! ladder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use serde::Serialize;
use tracing::debug;

use crate::artifact::RecoveryRequest;
use crate::config::CacheConfig;
use crate::resolve::{ResolutionResult, StrategyResolver};

/// Counters for cache effectiveness, all monotonic.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub entries: u64,
}

pub struct ResolutionCache {
    entries: Cache<String, Arc<ResolutionResult>>,
    budget: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl ResolutionCache {
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.entry_ttl())
            .build();
        Self {
            entries,
            budget: config.resolution_budget(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    /// Returns the memoized result for this request, or resolves under the
    /// configured budget and memoizes on success.
    pub fn get_or_resolve(
        &self,
        resolver: &StrategyResolver,
        request: &RecoveryRequest,
    ) -> Arc<ResolutionResult> {
        let key = request.fingerprint();
        if let Some(cached) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(artifact_id = %request.artifact_id, "Resolution cache hit");
            return cached;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let deadline = Instant::now() + self.budget;
        let result = Arc::new(resolver.resolve_with_deadline(request, Some(deadline)));
        if result.success {
            self.entries.insert(key, Arc::clone(&result));
            self.inserts.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
