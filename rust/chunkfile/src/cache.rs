//! Chunk cache policies used by [`ChunkStore`](crate::ChunkStore).
//!
//! A cache maps a chunk index to the materialized elements of that chunk. Cached
//! values are authoritative: once a chunk is present, it is returned as-is until
//! (and unless) the policy evicts it. Chunks are handed out as `Arc<[E]>`, so an
//! evicted chunk stays alive for as long as some view still references it.

use std::{num::NonZeroUsize, sync::Arc};

use ahash::AHashMap;
use chunkfile_common::{Result, error::Error};

use crate::Element;

/// Storage for materialized chunks, keyed by chunk index.
pub trait ChunkCache<E>: Send {
    /// Returns the cached chunk, marking it as recently used where the policy
    /// tracks recency.
    fn get(&mut self, index: u64) -> Option<Arc<[E]>>;

    /// Inserts a chunk. Returns the index of a chunk that had to be evicted to
    /// make room, if any.
    fn insert(&mut self, index: u64, chunk: Arc<[E]>) -> Option<u64>;

    /// Returns `true` if the chunk is currently cached, without touching its
    /// recency.
    fn contains(&self, index: u64) -> bool;

    /// Number of chunks currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selects the [`ChunkCache`] implementation a store is created with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Every chunk ever fetched is retained for the lifetime of the store.
    #[default]
    Unbounded,
    /// At most `capacity` chunks are retained; the least recently used chunk
    /// is evicted first.
    Lru { capacity: NonZeroUsize },
}

impl CachePolicy {
    /// Creates a bounded LRU policy holding at most `capacity` chunks.
    pub fn lru(capacity: usize) -> Result<CachePolicy> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::invalid_arg("capacity", "capacity > 0"))?;
        Ok(CachePolicy::Lru { capacity })
    }

    pub(crate) fn build<E: Element>(self) -> Box<dyn ChunkCache<E>> {
        match self {
            CachePolicy::Unbounded => Box::new(UnboundedChunkCache::new()),
            CachePolicy::Lru { capacity } => Box::new(LruChunkCache::new(capacity)),
        }
    }
}

/// A cache that never evicts.
pub struct UnboundedChunkCache<E> {
    chunks: AHashMap<u64, Arc<[E]>>,
}

impl<E> UnboundedChunkCache<E> {
    pub fn new() -> Self {
        UnboundedChunkCache {
            chunks: AHashMap::new(),
        }
    }
}

impl<E> Default for UnboundedChunkCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element> ChunkCache<E> for UnboundedChunkCache<E> {
    fn get(&mut self, index: u64) -> Option<Arc<[E]>> {
        self.chunks.get(&index).cloned()
    }

    fn insert(&mut self, index: u64, chunk: Arc<[E]>) -> Option<u64> {
        self.chunks.insert(index, chunk);
        None
    }

    fn contains(&self, index: u64) -> bool {
        self.chunks.contains_key(&index)
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

/// A bounded cache with least-recently-used eviction.
pub struct LruChunkCache<E> {
    chunks: lru::LruCache<u64, Arc<[E]>>,
}

impl<E> LruChunkCache<E> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        LruChunkCache {
            chunks: lru::LruCache::new(capacity),
        }
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.chunks.cap()
    }
}

impl<E: Element> ChunkCache<E> for LruChunkCache<E> {
    fn get(&mut self, index: u64) -> Option<Arc<[E]>> {
        self.chunks.get(&index).cloned()
    }

    fn insert(&mut self, index: u64, chunk: Arc<[E]>) -> Option<u64> {
        match self.chunks.push(index, chunk) {
            Some((evicted, _)) if evicted != index => Some(evicted),
            _ => None,
        }
    }

    fn contains(&self, index: u64) -> bool {
        self.chunks.contains(&index)
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(value: u8) -> Arc<[u8]> {
        vec![value; 4].into()
    }

    #[test]
    fn test_unbounded_cache_keeps_everything() {
        let mut cache = UnboundedChunkCache::<u8>::new();
        assert!(cache.is_empty());
        for i in 0..100 {
            assert_eq!(cache.insert(i, chunk(i as u8)), None);
        }
        assert_eq!(cache.len(), 100);
        assert!(cache.contains(0));
        assert_eq!(&*cache.get(42).unwrap(), &[42u8; 4]);
        assert!(cache.get(100).is_none());
    }

    #[test]
    fn test_lru_cache_evicts_least_recent() {
        let mut cache = LruChunkCache::<u8>::new(NonZeroUsize::new(2).unwrap());
        assert_eq!(cache.insert(0, chunk(0)), None);
        assert_eq!(cache.insert(1, chunk(1)), None);

        // Touch chunk 0 so that chunk 1 becomes the eviction candidate.
        assert!(cache.get(0).is_some());
        assert_eq!(cache.insert(2, chunk(2)), Some(1));

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity().get(), 2);
    }

    #[test]
    fn test_lru_cache_reinsert_is_not_eviction() {
        let mut cache = LruChunkCache::<u8>::new(NonZeroUsize::new(1).unwrap());
        assert_eq!(cache.insert(5, chunk(1)), None);
        assert_eq!(cache.insert(5, chunk(2)), None);
        assert_eq!(&*cache.get(5).unwrap(), &[2u8; 4]);
    }

    #[test]
    fn test_evicted_chunk_outlives_cache_entry() {
        let mut cache = LruChunkCache::<u8>::new(NonZeroUsize::new(1).unwrap());
        cache.insert(0, chunk(9));
        let held = cache.get(0).unwrap();
        assert_eq!(cache.insert(1, chunk(1)), Some(0));
        assert_eq!(&*held, &[9u8; 4]);
    }

    #[test]
    fn test_policy_constructor() {
        assert_eq!(CachePolicy::default(), CachePolicy::Unbounded);
        let policy = CachePolicy::lru(8).unwrap();
        assert_eq!(
            policy,
            CachePolicy::Lru {
                capacity: NonZeroUsize::new(8).unwrap()
            }
        );
        assert!(CachePolicy::lru(0).is_err());
    }
}
