//! Optional memoization of chunk encodings.
//!
//! Natural text repeats the same words constantly, so remembering the tokens of recently seen
//! chunks skips most of the merge loop.  The cache is shared by every clone of an encoding and
//! sits behind a mutex, which is why it is off unless [`crate::Config::cache_capacity`] asks for
//! it.
use crate::token::TokenInt;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Bounded LRU map from chunk bytes to the tokens they encode to.
pub struct ChunkCache {
    entries: Mutex<LruCache<Vec<u8>, Arc<[TokenInt]>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Counters describing how well the cache is doing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl ChunkCache {
    /// Create a cache holding up to `capacity` chunks, or `None` if `capacity` is 0.
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;

        Some(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Return the cached tokens for `chunk`, computing and remembering them on a miss.
    ///
    /// `encode` runs without the lock held.  A poisoned lock is treated as a miss.
    pub fn get_or_insert_with(
        &self,
        chunk: &[u8],
        encode: impl FnOnce() -> Vec<TokenInt>,
    ) -> Arc<[TokenInt]> {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(tokens) = entries.get(chunk) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return tokens.clone();
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let tokens: Arc<[TokenInt]> = encode().into();

        if let Ok(mut entries) = self.entries.lock() {
            entries.put(chunk.to_vec(), tokens.clone());
        }

        tokens
    }

    pub fn stats(&self) -> CacheStats {
        let (len, capacity) = match self.entries.lock() {
            Ok(entries) => (entries.len(), entries.cap().get()),
            Err(_) => (0, 0),
        };

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len,
            capacity,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
