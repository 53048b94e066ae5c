//! Displayable reference cache.
//!
//! Entries are append-only for the cache's lifetime: once an id has a
//! reference, every later lookup returns that same `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::record::{Blob, FrameId};

/// Cheap handle for repeated display of a frame.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameReference {
    pub id: FrameId,
    /// Opaque URL-like locator, unique per reference.
    pub url: String,
    pub blob: Blob,
}

/// Process- or session-scoped map from frame id to its reference.
///
/// Clones share the same entries. Tests build a fresh cache per store.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: Mutex<HashMap<FrameId, Arc<FrameReference>>>,
    created: AtomicU64,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FrameId) -> Option<Arc<FrameReference>> {
        self.lock().get(&id).cloned()
    }

    /// Insert a reference built from `blob` unless one already exists.
    ///
    /// Always returns the reference that ends up cached, so concurrent
    /// callers racing on a miss agree on one instance.
    pub fn get_or_insert(&self, id: FrameId, blob: Blob) -> Arc<FrameReference> {
        let mut entries = self.lock();
        let created = &self.inner.created;
        Arc::clone(entries.entry(id).or_insert_with(|| {
            let serial = created.fetch_add(1, Ordering::Relaxed) + 1;
            Arc::new(FrameReference {
                id,
                url: format!("blob:flipbook/{serial}-{}", id.0),
                blob,
            })
        }))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// References created so far. Equals `len()` because entries are never replaced.
    pub fn created(&self) -> u64 {
        self.inner.created.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FrameId, Arc<FrameReference>>> {
        // The map stays consistent even if a holder panicked mid-lookup.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
