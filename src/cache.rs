//! Ad-hoc pattern cache
//!
//! Patterns passed as plain text on each call are compiled once and kept in
//! a bounded LRU keyed by the database encoding and the exact pattern bytes.
//! The same bytes mean different patterns in different encodings, so
//! sessions with different encodings sharing one cache never see each
//! other's entries. A hit moves the entry to the front; a miss at capacity
//! evicts the back entry.
//!
//! Lookup, move-to-front, insert and evict all happen under one lock, so
//! concurrent sessions sharing the cache never observe a half-finished
//! eviction.

use crate::encoding::DatabaseEncoding;
use crate::engine::{CompileOptions, PatternHandle, SyntaxMode};
use crate::error::{Error, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Default number of cached patterns
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Bounded cache of compiled ad-hoc patterns
pub struct PatternCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    encoding: DatabaseEncoding,
    pattern: Vec<u8>,
}

struct CacheInner {
    entries: LruCache<CacheKey, Arc<PatternHandle>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl PatternCache {
    /// Create a cache holding at most `capacity` patterns
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::InvalidArgument("Pattern cache capacity must be at least 1".to_string())
        })?;
        Ok(Self::with_capacity(capacity))
    }

    fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Resolve `pattern` (raw bytes in `encoding`) to a compiled handle,
    /// compiling and caching it on a miss.
    pub fn compile_and_cache(
        &self,
        pattern: &[u8],
        encoding: DatabaseEncoding,
        options: &CompileOptions,
    ) -> Result<Arc<PatternHandle>> {
        self.get_or_compile(pattern, encoding, |bytes| {
            let normalized = encoding.normalize(bytes)?;
            PatternHandle::compile(&normalized, SyntaxMode::for_encoding(encoding), options)
        })
    }

    /// Look up `pattern` as written in `encoding`, falling back to `compile`
    /// on a miss.
    ///
    /// The cache is left untouched if `compile` fails or the key copy cannot
    /// be allocated.
    pub fn get_or_compile<F>(
        &self,
        pattern: &[u8],
        encoding: DatabaseEncoding,
        compile: F,
    ) -> Result<Arc<PatternHandle>>
    where
        F: FnOnce(&[u8]) -> Result<PatternHandle>,
    {
        let mut copy = Vec::new();
        copy.try_reserve_exact(pattern.len()).map_err(|e| {
            Error::OutOfMemory(format!("Cannot copy {}-byte pattern: {}", pattern.len(), e))
        })?;
        copy.extend_from_slice(pattern);
        let key = CacheKey {
            encoding,
            pattern: copy,
        };

        let mut inner = self.inner.lock();

        if let Some(handle) = inner.entries.get(&key) {
            let handle = Arc::clone(handle);
            inner.hits += 1;
            debug!(pattern_len = pattern.len(), encoding = %encoding, "Pattern cache hit");
            return Ok(handle);
        }

        inner.misses += 1;
        let handle = Arc::new(compile(pattern)?);

        if let Some((evicted, _)) = inner.entries.push(key, Arc::clone(&handle)) {
            inner.evictions += 1;
            debug!(
                evicted_len = evicted.pattern.len(),
                "Evicted least recently used pattern"
            );
        }
        debug!(
            pattern_len = pattern.len(),
            encoding = %encoding,
            size = inner.entries.len(),
            "Pattern cache miss, compiled"
        );

        Ok(handle)
    }

    /// Cached pattern keys, most recently used first
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(key, _)| key.pattern.clone())
            .collect()
    }

    /// Whether `pattern` is cached for `encoding`, without touching recency
    pub fn contains(&self, pattern: &[u8], encoding: DatabaseEncoding) -> bool {
        let key = CacheKey {
            encoding,
            pattern: pattern.to_vec(),
        };
        self.inner.lock().entries.contains(&key)
    }

    /// Number of cached patterns
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached patterns
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total > 0 {
            inner.hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
            size: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::with_capacity(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl std::fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("PatternCache")
            .field("size", &stats.size)
            .field("capacity", &stats.capacity)
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
}
