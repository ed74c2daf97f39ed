//! Engine event system.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::entitlements::{Term, Tier};

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Service has started successfully.
    Started,

    /// Service is shutting down.
    ShuttingDown,

    /// A fresh exchange rate was fetched and cached.
    RateRefreshed {
        /// USD to local-currency rate.
        rate: f64,
        /// Instant the cached rate goes stale.
        expires_at: DateTime<Utc>,
    },

    /// A provider order was created for a purchase attempt.
    OrderCreated {
        /// Provider order identifier.
        order_id: String,
        /// Tier being purchased.
        tier: Tier,
        /// Billing term.
        term: Term,
        /// Charge in minor currency units.
        amount_minor: u64,
    },

    /// A verified payment granted an entitlement.
    PurchaseGranted {
        /// Provider order identifier.
        order_id: String,
        /// Tier granted.
        tier: Tier,
        /// Billing term.
        term: Term,
        /// Entitlement expiry.
        expires_at: DateTime<Utc>,
    },

    /// A purchase attempt ended without a grant.
    PurchaseRejected {
        /// Provider order identifier, when one was created.
        order_id: Option<String>,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// Expired entitlements were garbage-collected.
    EntitlementsSwept {
        /// Number of expired entitlements removed.
        removed: usize,
    },
}

/// Channel for receiving engine events.
pub type EngineEventsChannel = broadcast::Receiver<EngineEvent>;

/// Sender for engine events.
pub type EngineEventsSender = broadcast::Sender<EngineEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (EngineEventsSender, EngineEventsChannel) {
    broadcast::channel(256)
}
