//! Process-local caches keyed by content hash
//!
//! Sharded maps with per-shard locks and LRU eviction under an
//! approximate byte budget. Used for converted markdown and for
//! whole-document embedding sets, so a file dispatched twice in one
//! session does not repeat conversion or provider calls.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

const SHARD_COUNT: usize = 8;

/// Total byte budget across all caches
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 128 * 1024 * 1024;

struct Entry<V> {
    value: V,
    bytes: usize,
    last_used: u64,
}

struct Shard<K, V> {
    map: HashMap<K, Entry<V>>,
    bytes: usize,
    tick: u64,
}

impl<K: Hash + Eq, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            bytes: 0,
            tick: 0,
        }
    }
}

/// LRU cache split into independently locked shards
pub struct ShardedLruCache<K, V> {
    shards: Vec<Mutex<Shard<K, V>>>,
    max_bytes_per_shard: usize,
    weigher: fn(&V) -> usize,
}

impl<K, V> ShardedLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(max_bytes_total: usize, weigher: fn(&V) -> usize) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(Shard::new())).collect(),
            max_bytes_per_shard: (max_bytes_total / SHARD_COUNT).max(1),
            weigher,
        }
    }

    fn shard_for(&self, key: &K) -> &Mutex<Shard<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut shard = self.shard_for(key).lock().ok()?;
        shard.tick += 1;
        let tick = shard.tick;
        let entry = shard.map.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let bytes = (self.weigher)(&value);
        if bytes > self.max_bytes_per_shard {
            return;
        }
        let Ok(mut shard) = self.shard_for(&key).lock() else {
            return;
        };
        shard.tick += 1;
        let tick = shard.tick;

        if let Some(old) = shard.map.remove(&key) {
            shard.bytes -= old.bytes;
        }
        shard.map.insert(
            key,
            Entry {
                value,
                bytes,
                last_used: tick,
            },
        );
        shard.bytes += bytes;

        while shard.bytes > self.max_bytes_per_shard {
            let Some(oldest) = shard
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(evicted) = shard.map.remove(&oldest) {
                shard.bytes -= evicted.bytes;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .filter_map(|shard| shard.lock().ok())
            .map(|shard| shard.map.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `content_hash → markdown` for repeat conversions
pub type MarkdownCache = ShardedLruCache<String, String>;

/// `(content_hash, model, chunk_size, overlap) → vectors` so re-ingests
/// under identical chunking skip the provider
pub type EmbeddingSetCache = ShardedLruCache<(String, String, usize, usize), Vec<Vec<f32>>>;

pub fn markdown_cache(budget_bytes: usize) -> MarkdownCache {
    ShardedLruCache::new(budget_bytes, |markdown| markdown.len())
}

pub fn embedding_set_cache(budget_bytes: usize) -> EmbeddingSetCache {
    ShardedLruCache::new(budget_bytes, |vectors| {
        vectors.iter().map(|v| v.len() * 4).sum::<usize>() + 64
    })
}

/// The engine's cache set, budget split between the two maps
pub struct EngineCaches {
    pub markdown: MarkdownCache,
    pub embeddings: EmbeddingSetCache,
}

impl EngineCaches {
    pub fn with_budget(total_bytes: usize) -> Self {
        Self {
            markdown: markdown_cache(total_bytes / 2),
            embeddings: embedding_set_cache(total_bytes / 2),
        }
    }
}

impl Default for EngineCaches {
    fn default() -> Self {
        Self::with_budget(DEFAULT_CACHE_BUDGET_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_insert() {
        let cache = markdown_cache(1024 * 1024);
        cache.insert("hash-a".to_string(), "# doc".to_string());
        assert_eq!(cache.get(&"hash-a".to_string()).as_deref(), Some("# doc"));
        assert!(cache.get(&"hash-b".to_string()).is_none());
    }

    #[test]
    fn test_eviction_under_budget() {
        // Tiny budget: one ~100-byte value per shard at most
        let cache = markdown_cache(SHARD_COUNT * 150);
        for i in 0..50 {
            cache.insert(format!("hash-{}", i), "x".repeat(100));
        }
        assert!(cache.len() <= SHARD_COUNT);
    }

    #[test]
    fn test_reinsert_replaces_without_growth() {
        let cache = markdown_cache(1024 * 1024);
        cache.insert("hash".to_string(), "first".to_string());
        cache.insert("hash".to_string(), "second".to_string());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"hash".to_string()).as_deref(), Some("second"));
    }

    #[test]
    fn test_oversized_value_not_cached() {
        let cache = markdown_cache(SHARD_COUNT * 10);
        cache.insert("big".to_string(), "x".repeat(1000));
        assert!(cache.get(&"big".to_string()).is_none());
    }

    #[test]
    fn test_embedding_cache_key_includes_chunking() {
        let cache = embedding_set_cache(1024 * 1024);
        let key_a = ("hash".to_string(), "model".to_string(), 1200, 150);
        let key_b = ("hash".to_string(), "model".to_string(), 800, 150);
        cache.insert(key_a.clone(), vec![vec![1.0, 2.0]]);
        assert!(cache.get(&key_a).is_some());
        assert!(cache.get(&key_b).is_none());
    }
}
