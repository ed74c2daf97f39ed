//! Tiered, time-boxed entitlements.
//!
//! Entitlements are server-authoritative: this engine is the only writer,
//! and clients learn their state by asking, never by asserting it.

mod catalog;
mod store;

pub use catalog::{TierCatalog, TierPlan};
pub use store::EntitlementStore;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque user key. The upstream identity provider decides what it contains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw user key.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Subscription tiers, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Removes ads from the dashboard.
    AdsFree,
    /// Interactive charts and air-quality panels.
    Basic,
    /// Severe-weather alerts and premium map layers; covers Basic.
    Pro,
}

impl Tier {
    /// All tiers, in catalog order.
    pub const ALL: [Self; 3] = [Self::AdsFree, Self::Basic, Self::Pro];

    /// Tiers whose feature set this tier covers.
    ///
    /// The relation is declared here rather than derived from names or
    /// prices: granting a tier also extends every tier it implies.
    #[must_use]
    pub fn implies(self) -> &'static [Self] {
        match self {
            Self::Pro => &[Self::Basic],
            Self::AdsFree | Self::Basic => &[],
        }
    }

    /// Stable identifier used in API payloads and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdsFree => "ads_free",
            Self::Basic => "basic",
            Self::Pro => "pro",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// 30 days.
    Monthly,
    /// 365 days.
    Annual,
}

impl Term {
    /// Entitlement lifetime granted by one purchase of this term.
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Monthly => Duration::days(30),
            Self::Annual => Duration::days(365),
        }
    }

    /// Stable identifier used in API payloads and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-boxed grant of one tier to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Granted tier.
    pub tier: Tier,
    /// Billing term the grant was made under.
    pub term: Term,
    /// Instant the grant stops being active.
    pub expires_at: DateTime<Utc>,
}

impl Entitlement {
    /// Whether the grant is active at `now`.
    ///
    /// Strict comparison: an entitlement is inactive at its exact expiry.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Everything one user holds, keyed by tier.
///
/// The map shape makes the one-entitlement-per-tier invariant structural:
/// inserting a tier a second time replaces the first grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitlementSet {
    entries: HashMap<Tier, Entitlement>,
}

impl EntitlementSet {
    /// Entitlement for `tier`, active or not.
    #[must_use]
    pub fn get(&self, tier: Tier) -> Option<&Entitlement> {
        self.entries.get(&tier)
    }

    /// Whether `tier` is active at `now`.
    #[must_use]
    pub fn is_active(&self, tier: Tier, now: DateTime<Utc>) -> bool {
        self.get(tier).is_some_and(|e| e.is_active(now))
    }

    /// Entitlements active at `now`, in catalog order.
    #[must_use]
    pub fn active(&self, now: DateTime<Utc>) -> Vec<&Entitlement> {
        Tier::ALL
            .iter()
            .filter_map(|tier| self.entries.get(tier))
            .filter(|e| e.is_active(now))
            .collect()
    }

    /// Records `entitlement`, replacing any existing grant of its tier.
    pub fn insert(&mut self, entitlement: Entitlement) {
        self.entries.insert(entitlement.tier, entitlement);
    }

    /// Drops entries inactive at `now`, returning how many were removed.
    pub fn retain_active(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_active(now));
        before - self.entries.len()
    }

    /// Number of recorded entitlements, expired rows included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over recorded entitlements in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Entitlement> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro_implies_basic_only() {
        assert_eq!(Tier::Pro.implies(), &[Tier::Basic]);
        assert!(Tier::Basic.implies().is_empty());
        assert!(Tier::AdsFree.implies().is_empty());
    }

    #[test]
    fn term_durations_are_calendar_fixed() {
        assert_eq!(Term::Monthly.duration(), Duration::days(30));
        assert_eq!(Term::Annual.duration(), Duration::days(365));
    }

    #[test]
    fn entitlement_is_inactive_at_exact_expiry() {
        let expires_at = DateTime::<Utc>::UNIX_EPOCH + Duration::days(30);
        let entitlement = Entitlement {
            tier: Tier::Basic,
            term: Term::Monthly,
            expires_at,
        };

        assert!(entitlement.is_active(expires_at - Duration::seconds(1)));
        assert!(!entitlement.is_active(expires_at));
        assert!(!entitlement.is_active(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn set_replaces_same_tier_on_insert() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let mut set = EntitlementSet::default();
        set.insert(Entitlement {
            tier: Tier::Basic,
            term: Term::Monthly,
            expires_at: now + Duration::days(30),
        });
        set.insert(Entitlement {
            tier: Tier::Basic,
            term: Term::Annual,
            expires_at: now + Duration::days(365),
        });

        assert_eq!(set.len(), 1);
        assert_eq!(set.get(Tier::Basic).map(|e| e.term), Some(Term::Annual));
    }

    #[test]
    fn tier_serializes_as_snake_case() {
        let json = serde_json::to_string(&Tier::AdsFree).unwrap_or_default();
        assert_eq!(json, "\"ads_free\"");
    }
}
