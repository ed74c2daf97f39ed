//! Provider order construction with cached FX conversion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::rates::RateCache;

use super::provider::PaymentGateway;

/// A created provider order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Provider-issued order identifier.
    pub id: String,
    /// Charge in minor currency units, as echoed by the provider.
    pub amount_minor: u64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Merchant receipt reference, embedding the creation time.
    pub receipt: String,
}

/// An order together with the conversion that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderQuote {
    /// The provider order.
    pub order: Order,
    /// Converted charge in whole local-currency units.
    pub amount_local: u64,
    /// Exchange rate used for the conversion.
    pub rate: f64,
}

/// Builds provider orders from USD amounts.
pub struct OrderBuilder {
    rates: Arc<RateCache>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    currency: String,
    seq: AtomicU64,
}

impl OrderBuilder {
    /// Creates a builder charging in `currency`.
    pub fn new(
        rates: Arc<RateCache>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            rates,
            gateway,
            clock,
            currency: currency.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// Creates a provider order for `amount_usd`.
    ///
    /// The local amount is `amount_usd * rate` rounded half away from
    /// zero, and the provider is charged `amount_local * 100` minor units.
    /// A failed build mutates nothing visible to later attempts.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAmount`] if `amount_usd` is not positive and
    ///   finite, rejected before any rate fetch or provider call.
    /// - [`Error::RateUnavailable`] if the exchange rate cannot be
    ///   obtained.
    /// - [`Error::OrderCreationFailed`] if the provider rejects the order.
    pub async fn build(&self, amount_usd: f64) -> Result<OrderQuote> {
        if !amount_usd.is_finite() || amount_usd <= 0.0 {
            return Err(Error::InvalidAmount(format!("{amount_usd} USD")));
        }

        let rate = self.rates.current_rate().await?;
        let amount_local = to_local_units(amount_usd, rate)?;
        let amount_minor = amount_local.checked_mul(100).ok_or_else(|| {
            Error::InvalidAmount(format!("{amount_usd} USD overflows minor units"))
        })?;
        let receipt = self.next_receipt();

        let created = self
            .gateway
            .create_order(amount_minor, &self.currency, &receipt)
            .await?;

        info!(order_id = %created.id, amount_minor, currency = %self.currency, "provider order created");
        Ok(OrderQuote {
            order: Order {
                id: created.id,
                amount_minor: created.amount,
                currency: created.currency,
                receipt,
            },
            amount_local,
            rate,
        })
    }

    /// Public provider key the client-side checkout widget is opened with.
    #[must_use]
    pub fn checkout_key(&self) -> &str {
        self.gateway.checkout_key()
    }

    /// Receipt references embed creation time; the sequence suffix keeps
    /// same-millisecond orders distinct.
    fn next_receipt(&self) -> String {
        let millis = self.clock.now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("receipt_{millis}_{seq}")
    }
}

/// Converts a USD amount to whole local units.
///
/// `f64::round` is round-half-away-from-zero, which is the contract here:
/// 2.5 USD at rate 83 is 207.5, charged as 208.
fn to_local_units(amount_usd: f64, rate: f64) -> Result<u64> {
    let local = (amount_usd * rate).round();
    if !local.is_finite() || local < 0.0 || local > u64::MAX as f64 {
        return Err(Error::InvalidAmount(format!(
            "{amount_usd} USD at rate {rate} is out of range"
        )));
    }
    Ok(local as u64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::checkout::ProviderOrder;
    use crate::clock::ManualClock;
    use crate::rates::RateProvider;
    use async_trait::async_trait;
    use chrono::Duration;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicU32;

    struct FixedRate {
        rate: f64,
        calls: AtomicU32,
    }

    impl FixedRate {
        fn new(rate: f64) -> Self {
            Self {
                rate,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RateProvider for FixedRate {
        async fn fetch_rate(&self) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rate)
        }
    }

    struct StubGateway {
        orders: AtomicU64,
        fail: bool,
    }

    impl StubGateway {
        fn new() -> Self {
            Self {
                orders: AtomicU64::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                orders: AtomicU64::new(0),
                fail: true,
            }
        }

        fn created(&self) -> u64 {
            self.orders.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_order(
            &self,
            amount_minor: u64,
            currency: &str,
            _receipt: &str,
        ) -> Result<ProviderOrder> {
            if self.fail {
                return Err(Error::OrderCreationFailed("stub outage".to_string()));
            }
            let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ProviderOrder {
                id: format!("order_stub_{n}"),
                amount: amount_minor,
                currency: currency.to_string(),
            })
        }

        fn checkout_key(&self) -> &str {
            "rzp_test_stub"
        }
    }

    fn builder_at(rate: f64) -> (OrderBuilder, Arc<FixedRate>, Arc<StubGateway>, ManualClock) {
        let provider = Arc::new(FixedRate::new(rate));
        let gateway = Arc::new(StubGateway::new());
        let clock = ManualClock::at_epoch();
        let cache = Arc::new(RateCache::new(
            provider.clone(),
            Arc::new(clock.clone()),
            Duration::hours(1),
        ));
        let builder = OrderBuilder::new(cache, gateway.clone(), Arc::new(clock.clone()), "INR");
        (builder, provider, gateway, clock)
    }

    #[tokio::test]
    async fn converts_usd_at_cached_rate() {
        let (builder, _, _, _) = builder_at(83.0);

        let quote = builder.build(2.5).await.unwrap();

        // 2.5 * 83 = 207.5, rounded away from zero.
        assert_eq!(quote.amount_local, 208);
        assert_eq!(quote.order.amount_minor, 20_800);
        assert_eq!(quote.order.currency, "INR");
        assert!((quote.rate - 83.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rejects_bad_amounts_before_any_call() {
        let (builder, provider, gateway, _) = builder_at(83.0);

        for amount in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let result = builder.build(amount).await;
            assert!(matches!(result, Err(Error::InvalidAmount(_))));
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.created(), 0);
    }

    #[tokio::test]
    async fn same_window_orders_share_one_rate_fetch() {
        let (builder, provider, _, _) = builder_at(83.0);

        let first = builder.build(5.0).await.unwrap();
        let second = builder.build(5.0).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.order.amount_minor, second.order.amount_minor);
        assert_ne!(first.order.id, second.order.id);
        assert_ne!(first.order.receipt, second.order.receipt);
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_and_recovers() {
        let provider = Arc::new(FixedRate::new(83.0));
        let clock = ManualClock::at_epoch();
        let cache = Arc::new(RateCache::new(
            provider,
            Arc::new(clock.clone()),
            Duration::hours(1),
        ));
        let failing = OrderBuilder::new(
            cache.clone(),
            Arc::new(StubGateway::failing()),
            Arc::new(clock.clone()),
            "INR",
        );

        let result = failing.build(5.0).await;
        assert!(matches!(result, Err(Error::OrderCreationFailed(_))));

        // The same cache serves a healthy builder untouched.
        let healthy = OrderBuilder::new(
            cache,
            Arc::new(StubGateway::new()),
            Arc::new(clock.clone()),
            "INR",
        );
        let quote = healthy.build(5.0).await;
        assert!(quote.is_ok());
    }

    #[tokio::test]
    async fn receipts_embed_creation_time() {
        let (builder, _, _, clock) = builder_at(83.0);
        clock.advance(Duration::milliseconds(1_234));

        let quote = builder.build(1.0).await.unwrap();

        assert!(quote.order.receipt.starts_with("receipt_1234_"));
    }

    proptest! {
        #[test]
        fn halves_round_away_from_zero(k in 0u32..100_000) {
            let amount = f64::from(k) + 0.5;
            let local = to_local_units(amount, 1.0);
            prop_assert!(matches!(local, Ok(v) if v == u64::from(k) + 1));
        }

        #[test]
        fn conversion_is_monotone_in_amount(
            a in 0.01f64..10_000.0,
            b in 0.01f64..10_000.0,
            rate in 0.1f64..500.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_units = to_local_units(lo, rate).unwrap_or(0);
            let hi_units = to_local_units(hi, rate).unwrap_or(u64::MAX);
            prop_assert!(lo_units <= hi_units);
        }

        #[test]
        fn whole_amounts_at_integer_rates_convert_exactly(
            amount in 1u32..10_000,
            rate in 1u32..500,
        ) {
            let local = to_local_units(f64::from(amount), f64::from(rate));
            prop_assert!(matches!(local, Ok(v) if v == u64::from(amount) * u64::from(rate)));
        }
    }
}
