//! Metadata cache for image descriptors.
//!
//! A bounded mapping from cache key to [`ImageDescriptor`]. Entries are
//! `Arc`-pinned, so a descriptor borrowed by an in-flight request survives
//! its own eviction. Eviction is FIFO: lookups deliberately use `peek`, so
//! the underlying LRU order never changes after insertion and the
//! least-recently-used victim is always the oldest insertion.
//!
//! A capacity of zero disables the cache entirely; every request then
//! builds and discards its own descriptor.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use crate::source::ImageDescriptor;

/// Build the cache key for a resolved path and effective max sample size.
///
/// The size suffix keeps restricted and unrestricted views of the same file
/// from colliding.
pub fn cache_key(path: &str, max_sample_size: u32) -> String {
    format!("{path}__{max_sample_size}")
}

/// Bounded FIFO cache of image descriptors.
pub struct MetadataCache {
    inner: Option<RwLock<LruCache<String, Arc<ImageDescriptor>>>>,
}

impl MetadataCache {
    /// Create a cache holding up to `capacity` descriptors (0 disables).
    pub fn new(capacity: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|cap| RwLock::new(LruCache::new(cap)));
        Self { inner }
    }

    /// Whether the cache is enabled.
    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up a descriptor without touching the eviction order.
    pub async fn get(&self, key: &str) -> Option<Arc<ImageDescriptor>> {
        let inner = self.inner.as_ref()?;
        let cache = inner.read().await;
        cache.peek(key).cloned()
    }

    /// Insert a descriptor, evicting the oldest entry when at capacity.
    pub async fn insert(&self, key: String, descriptor: Arc<ImageDescriptor>) {
        if let Some(inner) = &self.inner {
            let mut cache = inner.write().await;
            cache.put(key, descriptor);
        }
    }

    /// Swap the descriptor stored under `key` without changing its position
    /// in the eviction order. Used when on-disk metadata changed.
    pub async fn replace(&self, key: &str, descriptor: Arc<ImageDescriptor>) {
        if let Some(inner) = &self.inner {
            let mut cache = inner.write().await;
            if let Some(slot) = cache.peek_mut(key) {
                *slot = descriptor;
            } else {
                cache.put(key.to_string(), descriptor);
            }
        }
    }

    /// Number of cached descriptors.
    pub async fn len(&self) -> usize {
        match &self.inner {
            Some(inner) => inner.read().await.len(),
            None => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.write().await.clear();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
