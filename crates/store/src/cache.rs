//! Short-lived availability cache for browse traffic.
//!
//! Product pages tolerate slightly stale counts; checkout never reads
//! through here. Entries expire after a fixed TTL and the authoritative
//! counters are re-read on miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::VariantId;
use domain::Availability;
use tokio::sync::RwLock;

struct Entry {
    availability: Availability,
    cached_at: Instant,
}

/// TTL cache over per-variant availability snapshots.
#[derive(Clone)]
pub struct AvailabilityCache {
    entries: Arc<RwLock<HashMap<VariantId, Entry>>>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached snapshot if it is still fresh.
    pub async fn get(&self, variant_id: VariantId) -> Option<Availability> {
        let entries = self.entries.read().await;
        let entry = entries.get(&variant_id)?;
        if entry.cached_at.elapsed() >= self.ttl {
            metrics::counter!("availability_cache_misses_total").increment(1);
            return None;
        }
        metrics::counter!("availability_cache_hits_total").increment(1);
        Some(entry.availability)
    }

    /// Stores a fresh snapshot.
    pub async fn put(&self, variant_id: VariantId, availability: Availability) {
        let mut entries = self.entries.write().await;
        entries.insert(
            variant_id,
            Entry {
                availability,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drops a variant's entry after a write to its counters.
    pub async fn invalidate(&self, variant_id: VariantId) {
        self.entries.write().await.remove(&variant_id);
    }
}
