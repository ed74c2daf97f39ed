//! Server-authoritative entitlement store.
//!
//! In-memory by design: the engine process owns subscription truth for its
//! lifetime. At most one entitlement exists per (user, tier); granting
//! overwrites rather than stacking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::{Entitlement, EntitlementSet, Term, Tier, UserId};

/// In-memory entitlement registry keyed by user.
#[derive(Debug, Default)]
pub struct EntitlementStore {
    inner: Mutex<HashMap<UserId, EntitlementSet>>,
}

impl EntitlementStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `tier` to `user` for one `term` starting at `now`.
    ///
    /// The new expiry is `now + term.duration()`, replacing any existing
    /// entitlement for the tier. Terms never stack: re-granting while
    /// active resets the clock from `now` instead of extending the old
    /// expiry.
    ///
    /// Tiers implied by `tier` are extended in the same lock scope. Each
    /// ends up with expiry `max(its current expiry, the new grant's
    /// expiry)`, keeping its recorded term when it already exists and
    /// taking the purchase term otherwise. A grant never shortens anything
    /// and never touches tiers that merely imply the granted one.
    pub fn grant(&self, user: &UserId, tier: Tier, term: Term, now: DateTime<Utc>) -> Entitlement {
        let expires_at = now + term.duration();
        let granted = Entitlement {
            tier,
            term,
            expires_at,
        };

        let mut users = self.inner.lock();
        let set = users.entry(user.clone()).or_default();
        set.insert(granted.clone());

        for &implied in tier.implies() {
            let (implied_term, implied_expiry) = match set.get(implied) {
                Some(existing) => (existing.term, existing.expires_at.max(expires_at)),
                None => (term, expires_at),
            };
            set.insert(Entitlement {
                tier: implied,
                term: implied_term,
                expires_at: implied_expiry,
            });
        }
        drop(users);

        debug!(user = %user, tier = %tier, term = %term, expires_at = %expires_at, "entitlement granted");
        granted
    }

    /// Whether `user` holds an active `tier` at `now`.
    #[must_use]
    pub fn is_active(&self, user: &UserId, tier: Tier, now: DateTime<Utc>) -> bool {
        self.inner
            .lock()
            .get(user)
            .is_some_and(|set| set.is_active(tier, now))
    }

    /// Snapshot of everything `user` holds, expired rows included.
    #[must_use]
    pub fn entitlements(&self, user: &UserId) -> EntitlementSet {
        self.inner.lock().get(user).cloned().unwrap_or_default()
    }

    /// Removes entitlements no longer active at `now`.
    ///
    /// Expired rows are already inert (`is_active` answers false for them),
    /// so sweeping only reclaims memory. Users left with nothing are
    /// dropped entirely. Returns the number of entitlements removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut users = self.inner.lock();
        let mut removed = 0;
        users.retain(|_, set| {
            removed += set.retain_active(now);
            !set.is_empty()
        });
        drop(users);

        if removed > 0 {
            debug!(removed, "swept expired entitlements");
        }
        removed
    }

    /// Number of users with at least one recorded entitlement.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.inner.lock().len()
    }
}
