//! Cached USD to local-currency exchange rates.
//!
//! One currency pair, one snapshot, refreshed synchronously on expiry.
//! A stale snapshot is never served and never used as a fallback when a
//! refresh fails.

mod provider;

pub use provider::{ExchangeRateClient, RateProvider};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{EngineEvent, EngineEventsSender};

/// A cached exchange rate with its freshness window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSnapshot {
    /// USD to local-currency multiplier.
    pub rate: f64,
    /// Instant the rate was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Instant the rate goes stale; always `fetched_at + ttl`.
    pub expires_at: DateTime<Utc>,
}

impl RateSnapshot {
    /// Whether the snapshot is still fresh at `now`.
    ///
    /// A snapshot is stale at its exact expiry instant.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct RateCacheStats {
    /// Calls served from the cached snapshot.
    pub hits: u64,
    /// Calls that found the snapshot stale or absent.
    pub misses: u64,
    /// Successful refreshes.
    pub refreshes: u64,
}

/// Process-scoped cache around one USD-to-local rate pair.
///
/// The cache is explicitly constructed with its provider and clock; nothing
/// here is global. Concurrent refreshes are allowed to race: each successful
/// fetch replaces the whole snapshot and the last writer wins, which is
/// acceptable for a value that only drifts slowly.
pub struct RateCache {
    provider: Arc<dyn RateProvider>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Option<RateSnapshot>>,
    stats: Mutex<RateCacheStats>,
    events: Option<EngineEventsSender>,
}

impl RateCache {
    /// Creates a cache over `provider` with the given freshness window.
    pub fn new(provider: Arc<dyn RateProvider>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            provider,
            clock,
            ttl,
            snapshot: RwLock::new(None),
            stats: Mutex::new(RateCacheStats::default()),
            events: None,
        }
    }

    /// Like [`Self::new`], announcing each successful refresh on `events`.
    pub fn with_events(
        provider: Arc<dyn RateProvider>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        events: EngineEventsSender,
    ) -> Self {
        Self {
            events: Some(events),
            ..Self::new(provider, clock, ttl)
        }
    }

    /// Returns a fresh rate, fetching through the provider when needed.
    ///
    /// A fresh snapshot answers immediately without touching the provider.
    /// Otherwise the refresh is awaited inline; no lock is held while the
    /// provider call is in flight. On success the whole snapshot is
    /// replaced; on failure the cache is left exactly as it was and the
    /// error surfaces to the caller. There is no retry, no backoff, and no
    /// stale fallback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateUnavailable`] when the provider fails or hands
    /// back a rate that is not positive and finite.
    pub async fn current_rate(&self) -> Result<f64> {
        let now = self.clock.now();
        if let Some(snapshot) = *self.snapshot.read() {
            if snapshot.is_fresh(now) {
                self.stats.lock().hits += 1;
                return Ok(snapshot.rate);
            }
        }
        self.stats.lock().misses += 1;

        let rate = match self.provider.fetch_rate().await {
            Ok(rate) => rate,
            Err(err) => {
                warn!(error = %err, "exchange rate refresh failed");
                return Err(err);
            }
        };
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::RateUnavailable(format!(
                "provider returned unusable rate {rate}"
            )));
        }

        let snapshot = RateSnapshot {
            rate,
            fetched_at: now,
            expires_at: now + self.ttl,
        };
        *self.snapshot.write() = Some(snapshot);
        self.stats.lock().refreshes += 1;
        if let Some(events) = &self.events {
            let _ = events.send(EngineEvent::RateRefreshed {
                rate,
                expires_at: snapshot.expires_at,
            });
        }

        debug!(rate, expires_at = %snapshot.expires_at, "exchange rate refreshed");
        Ok(rate)
    }

    /// Current snapshot, fresh or stale, if one was ever stored.
    #[must_use]
    pub fn snapshot(&self) -> Option<RateSnapshot> {
        *self.snapshot.read()
    }

    /// Current cache statistics.
    #[must_use]
    pub fn stats(&self) -> RateCacheStats {
        self.stats.lock().clone()
    }

    /// Drops the cached snapshot, forcing the next call to refresh.
    pub fn invalidate(&self) {
        *self.snapshot.write() = None;
    }
}
