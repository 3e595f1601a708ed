use crate::domain::recommendation::Recommendation;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

// AI mode selects a cache partition and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePartition {
    Standard,
    AiMode,
}

impl CachePartition {
    pub fn for_ai_mode(ai_mode: bool) -> Self {
        if ai_mode {
            CachePartition::AiMode
        } else {
            CachePartition::Standard
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            CachePartition::Standard => "swing_recommendations",
            CachePartition::AiMode => "swing_recommendations_ai",
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    items: Vec<Recommendation>,
    stored_at: Instant,
}

/// In-memory TTL store. Expired or empty entries read as absent; reads
/// never mutate.
#[derive(Debug)]
pub struct RecommendationCache {
    ttl: Duration,
    entries: RwLock<HashMap<CachePartition, CacheEntry>>,
}

impl RecommendationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(crate::config::cache_ttl_from_env())
    }

    pub fn get(&self, partition: CachePartition) -> Option<Vec<Recommendation>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(partition = partition.key(), "cache lock poisoned during read; recovering");
                poisoned.into_inner()
            }
        };

        let entry = entries.get(&partition)?;
        if entry.stored_at.elapsed() >= self.ttl {
            tracing::debug!(partition = partition.key(), "cache entry expired");
            return None;
        }
        if entry.items.is_empty() {
            return None;
        }

        tracing::debug!(
            partition = partition.key(),
            count = entry.items.len(),
            "cache hit"
        );
        Some(entry.items.clone())
    }

    pub fn put(&self, partition: CachePartition, items: Vec<Recommendation>) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(partition = partition.key(), "cache lock poisoned during write; recovering");
                poisoned.into_inner()
            }
        };

        tracing::debug!(partition = partition.key(), count = items.len(), "cache store");
        entries.insert(
            partition,
            CacheEntry {
                items,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self, partition: CachePartition) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.remove(&partition);
    }

    pub fn clear_all(&self) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
    }
}
