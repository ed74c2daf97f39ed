//! Tier catalog: prices, feature lists, and upgrade charges.

use super::{Term, Tier};

/// One sellable plan.
#[derive(Debug, Clone, Copy)]
pub struct TierPlan {
    /// Tier sold.
    pub tier: Tier,
    /// Display name.
    pub name: &'static str,
    /// Whole-USD price for a monthly term.
    pub monthly_usd: u32,
    /// Whole-USD price for an annual term.
    pub annual_usd: u32,
    /// Features the tier unlocks.
    pub features: &'static [&'static str],
}

const PLANS: [TierPlan; 3] = [
    TierPlan {
        tier: Tier::AdsFree,
        name: "Ads Free",
        monthly_usd: 1,
        annual_usd: 10,
        features: &["Ad-free dashboard"],
    },
    TierPlan {
        tier: Tier::Basic,
        name: "Basic",
        monthly_usd: 5,
        annual_usd: 50,
        features: &["Interactive charts", "Air quality index"],
    },
    TierPlan {
        tier: Tier::Pro,
        name: "Pro",
        monthly_usd: 10,
        annual_usd: 100,
        features: &["Severe weather alerts", "Premium map layers"],
    },
];

/// Prices and features per tier.
///
/// Prices are whole USD so upgrade arithmetic stays in integers.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    plans: [TierPlan; 3],
}

impl TierCatalog {
    /// The catalog the dashboard ships with.
    #[must_use]
    pub fn standard() -> Self {
        Self { plans: PLANS }
    }

    /// Plan for `tier`.
    #[must_use]
    pub fn plan(&self, tier: Tier) -> &TierPlan {
        match tier {
            Tier::AdsFree => &self.plans[0],
            Tier::Basic => &self.plans[1],
            Tier::Pro => &self.plans[2],
        }
    }

    /// Price of `tier` for `term`, in whole USD.
    #[must_use]
    pub fn price_usd(&self, tier: Tier, term: Term) -> u32 {
        let plan = self.plan(tier);
        match term {
            Term::Monthly => plan.monthly_usd,
            Term::Annual => plan.annual_usd,
        }
    }

    /// Charge for buying `tier` at `term`, crediting active implied tiers.
    ///
    /// Each tier implied by `tier` that `is_active` reports as currently
    /// held is credited at its own price for the purchased term. The result
    /// is floored at 1 USD so a provider order always carries a positive
    /// amount.
    #[must_use]
    pub fn upgrade_charge_usd(
        &self,
        tier: Tier,
        term: Term,
        is_active: impl Fn(Tier) -> bool,
    ) -> u32 {
        let credit: u32 = tier
            .implies()
            .iter()
            .copied()
            .filter(|implied| is_active(*implied))
            .map(|implied| self.price_usd(implied, term))
            .sum();
        self.price_usd(tier, term).saturating_sub(credit).max(1)
    }

    /// All plans in catalog order.
    #[must_use]
    pub fn plans(&self) -> &[TierPlan] {
        &self.plans
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
