//! Bounded registry of purchase attempts awaiting client completion.
//!
//! Between order creation and payment verification the engine holds no
//! locks; pending attempts wait here instead. The registry is a bounded
//! LRU, so abandoned checkouts age out under capacity pressure rather
//! than accumulating for the life of the process.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::purchase::PurchaseAttempt;

/// Default capacity for pending attempts.
const DEFAULT_CAPACITY: usize = 4096;

/// Bounded LRU registry keyed by provider order id.
#[derive(Clone)]
pub struct AttemptRegistry {
    inner: Arc<Mutex<LruCache<String, PurchaseAttempt>>>,
    stats: Arc<Mutex<RegistryStats>>,
}

/// Registry statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    /// Attempts registered.
    pub registered: u64,
    /// Attempts consumed for verification.
    pub taken: u64,
    /// Attempts evicted while still pending.
    pub evicted: u64,
}

impl AttemptRegistry {
    /// Creates a registry with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a registry holding at most `capacity` pending attempts.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(RegistryStats::default())),
        }
    }

    /// Registers a pending attempt under its order id.
    ///
    /// A full registry evicts its least recently used entry. An evicted
    /// checkout can no longer complete, which is the intended fate of
    /// abandoned ones; nothing else ever cleans them up.
    pub fn register(&self, attempt: PurchaseAttempt) {
        let mut cache = self.inner.lock();
        let at_capacity = cache.len() == cache.cap().get();
        let replaced = cache.put(attempt.order_id.clone(), attempt);
        drop(cache);

        let mut stats = self.stats.lock();
        stats.registered += 1;
        if replaced.is_none() && at_capacity {
            stats.evicted += 1;
        }
    }

    /// Takes the pending attempt for `order_id`, if any.
    ///
    /// An attempt can be taken exactly once; a second completion for the
    /// same order finds nothing.
    pub fn take(&self, order_id: &str) -> Option<PurchaseAttempt> {
        let taken = self.inner.lock().pop(order_id);
        if taken.is_some() {
            self.stats.lock().taken += 1;
        }
        taken
    }

    /// Current registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.stats.lock().clone()
    }

    /// Number of pending attempts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drops all pending attempts.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for AttemptRegistry {
    fn default() -> Self {
        Self::new()
    }
}
