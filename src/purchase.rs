//! Purchase orchestration: quote, order, await, verify, grant.
//!
//! One attempt walks a linear lifecycle:
//!
//! ```text
//! Requested -> OrderCreated -> AwaitingCompletion -> Verifying -> Granted
//!     \-> Rejected                                       \-> Rejected
//! ```
//!
//! Both endings absorb. Every failure is terminal for its attempt and
//! leaves entitlements untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checkout::{
    AttemptRegistry, Order, OrderBuilder, OrderQuote, SignatureVerifier, Transaction,
};
use crate::clock::Clock;
use crate::entitlements::{Entitlement, EntitlementStore, Term, Tier, TierCatalog, UserId};
use crate::error::{Error, Result};
use crate::event::{EngineEvent, EngineEventsSender};

/// Phases of one purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    /// Tier and term chosen; nothing charged yet.
    Requested,
    /// A provider order exists.
    OrderCreated,
    /// The client is off completing payment. The engine holds no locks.
    AwaitingCompletion,
    /// A completion report arrived and is being checked.
    Verifying,
    /// Entitlement granted. Terminal.
    Granted,
    /// The attempt failed or the signature did not match. Terminal.
    Rejected,
}

impl PurchaseState {
    /// Whether the state absorbs all further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Granted | Self::Rejected)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Transitions only move forward; no state is ever revisited.
    #[must_use]
    pub fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::OrderCreated | Self::Rejected)
                | (Self::OrderCreated, Self::AwaitingCompletion)
                | (Self::AwaitingCompletion, Self::Verifying)
                | (Self::Verifying, Self::Granted | Self::Rejected)
        )
    }
}

/// One in-flight purchase, registered while awaiting completion.
#[derive(Debug, Clone)]
pub struct PurchaseAttempt {
    /// Buyer.
    pub user: UserId,
    /// Tier being purchased.
    pub tier: Tier,
    /// Billing term.
    pub term: Term,
    /// Whole-USD charge after any upgrade credit.
    pub charge_usd: u32,
    /// Provider order id the attempt is keyed by.
    pub order_id: String,
    /// Instant the attempt was opened.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle phase.
    pub state: PurchaseState,
}

impl PurchaseAttempt {
    /// Moves to `next` when the transition is legal; ignores it otherwise.
    ///
    /// Returns whether the transition happened. Terminal states absorb.
    pub fn advance(&mut self, next: PurchaseState) -> bool {
        if self.state.allows(next) {
            debug!(order_id = %self.order_id, from = ?self.state, to = ?next, "purchase state");
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// Everything the client needs to launch provider checkout.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseTicket {
    /// The provider order to pay.
    pub order: Order,
    /// Converted charge in whole local-currency units.
    pub amount_local: u64,
    /// Exchange rate used for the conversion.
    pub rate: f64,
    /// Whole-USD charge after any upgrade credit.
    pub charge_usd: u32,
    /// Public provider key for the checkout widget.
    pub checkout_key: String,
}

/// Result of processing one completed-payment report.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    /// Signature valid and a pending attempt matched: entitlement granted.
    Granted {
        /// The purchase that completed.
        attempt: PurchaseAttempt,
        /// Entitlement now held.
        entitlement: Entitlement,
    },
    /// Signature valid, but no pending attempt references the order.
    Verified,
    /// Signature mismatch. Any matching pending attempt was consumed.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

impl VerifyOutcome {
    /// Whether the payment's signature checked out.
    #[must_use]
    pub fn success(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Drives purchases from quote to grant.
pub struct PurchaseOrchestrator {
    catalog: TierCatalog,
    orders: OrderBuilder,
    verifier: SignatureVerifier,
    store: Arc<EntitlementStore>,
    attempts: AttemptRegistry,
    events: EngineEventsSender,
    clock: Arc<dyn Clock>,
}

impl PurchaseOrchestrator {
    /// Wires the orchestrator's collaborators.
    pub fn new(
        catalog: TierCatalog,
        orders: OrderBuilder,
        verifier: SignatureVerifier,
        store: Arc<EntitlementStore>,
        attempts: AttemptRegistry,
        events: EngineEventsSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            orders,
            verifier,
            store,
            attempts,
            events,
            clock,
        }
    }

    /// Opens a purchase of `tier` at `term` for `user`.
    ///
    /// The charge credits implied tiers the user actively holds: buying
    /// Pro while Basic is active charges the difference between the two
    /// prices for the purchased term, floored at 1 USD. On success the
    /// attempt sits in the pending registry awaiting client completion;
    /// nothing blocks other purchases in the meantime. On failure the
    /// attempt is rejected terminally and nothing is registered.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidAmount`], [`Error::RateUnavailable`] and
    /// [`Error::OrderCreationFailed`] from the quote and order steps.
    pub async fn begin(&self, user: &UserId, tier: Tier, term: Term) -> Result<PurchaseTicket> {
        let now = self.clock.now();
        let charge_usd =
            self.catalog
                .upgrade_charge_usd(tier, term, |t| self.store.is_active(user, t, now));

        let mut attempt = PurchaseAttempt {
            user: user.clone(),
            tier,
            term,
            charge_usd,
            order_id: String::new(),
            created_at: now,
            state: PurchaseState::Requested,
        };

        let quote = match self.orders.build(f64::from(charge_usd)).await {
            Ok(quote) => quote,
            Err(err) => {
                attempt.advance(PurchaseState::Rejected);
                warn!(user = %user, tier = %tier, error = %err, "purchase attempt rejected");
                let _ = self.events.send(EngineEvent::PurchaseRejected {
                    order_id: None,
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        attempt.order_id.clone_from(&quote.order.id);
        attempt.advance(PurchaseState::OrderCreated);
        let _ = self.events.send(EngineEvent::OrderCreated {
            order_id: quote.order.id.clone(),
            tier,
            term,
            amount_minor: quote.order.amount_minor,
        });

        attempt.advance(PurchaseState::AwaitingCompletion);
        self.attempts.register(attempt);

        info!(
            user = %user,
            tier = %tier,
            term = %term,
            charge_usd,
            order_id = %quote.order.id,
            "purchase awaiting completion"
        );
        Ok(PurchaseTicket {
            checkout_key: self.orders.checkout_key().to_string(),
            order: quote.order,
            amount_local: quote.amount_local,
            rate: quote.rate,
            charge_usd,
        })
    }

    /// Builds a provider order for an explicit USD amount.
    ///
    /// This is the unregistered quote path: no purchase attempt is
    /// created, so a later verification of the order succeeds without
    /// granting anything.
    ///
    /// # Errors
    ///
    /// Same as [`Self::begin`].
    pub async fn quote_order(&self, amount_usd: f64) -> Result<OrderQuote> {
        self.orders.build(amount_usd).await
    }

    /// Processes one completed-payment report.
    ///
    /// The verdict comes from the signature alone. A valid signature with
    /// a matching pending attempt grants the entitlement, implication
    /// included; without one it is a bare verification. An invalid
    /// signature consumes any matching attempt and rejects it, so the
    /// same order can never grant on a retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTransaction`] when required fields are
    /// missing; the pending attempt, if any, stays registered. A
    /// signature mismatch is not an `Err`: it is the
    /// [`VerifyOutcome::Rejected`] verdict.
    pub fn complete(&self, txn: &Transaction) -> Result<VerifyOutcome> {
        txn.validate()?;

        if !self.verifier.verify_transaction(txn) {
            let reason = Error::SignatureMismatch.to_string();
            if let Some(mut attempt) = self.attempts.take(&txn.order_id) {
                attempt.advance(PurchaseState::Verifying);
                attempt.advance(PurchaseState::Rejected);
                warn!(order_id = %txn.order_id, user = %attempt.user, "payment signature mismatch");
            } else {
                warn!(order_id = %txn.order_id, "payment signature mismatch");
            }
            let _ = self.events.send(EngineEvent::PurchaseRejected {
                order_id: Some(txn.order_id.clone()),
                reason: reason.clone(),
            });
            return Ok(VerifyOutcome::Rejected { reason });
        }

        let Some(mut attempt) = self.attempts.take(&txn.order_id) else {
            debug!(order_id = %txn.order_id, "signature valid for unregistered order");
            return Ok(VerifyOutcome::Verified);
        };

        attempt.advance(PurchaseState::Verifying);
        let now = self.clock.now();
        let entitlement = self
            .store
            .grant(&attempt.user, attempt.tier, attempt.term, now);
        attempt.advance(PurchaseState::Granted);

        info!(
            order_id = %txn.order_id,
            user = %attempt.user,
            tier = %attempt.tier,
            expires_at = %entitlement.expires_at,
            "purchase granted"
        );
        let _ = self.events.send(EngineEvent::PurchaseGranted {
            order_id: txn.order_id.clone(),
            tier: attempt.tier,
            term: attempt.term,
            expires_at: entitlement.expires_at,
        });

        Ok(VerifyOutcome::Granted {
            attempt,
            entitlement,
        })
    }

    /// Active entitlements for `user` right now, in catalog order.
    #[must_use]
    pub fn active_entitlements(&self, user: &UserId) -> Vec<Entitlement> {
        let now = self.clock.now();
        self.store
            .entitlements(user)
            .active(now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The catalog purchases are priced from.
    #[must_use]
    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Public provider key the client-side checkout widget needs.
    #[must_use]
    pub fn checkout_key(&self) -> &str {
        self.orders.checkout_key()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::checkout::ProviderOrder;
    use crate::clock::ManualClock;
    use crate::config::Secret;
    use crate::event::create_event_channel;
    use crate::rates::{RateCache, RateProvider};
    use async_trait::async_trait;
    use chrono::Duration;
    use hmac::{Hmac, Mac};
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use tokio::sync::broadcast;

    const SECRET: &str = "orchestrator_test_secret";

    struct FixedRate {
        rate: f64,
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RateProvider for FixedRate {
        async fn fetch_rate(&self) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::RateUnavailable("scripted outage".to_string()))
            } else {
                Ok(self.rate)
            }
        }
    }

    struct StubGateway {
        orders: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl crate::checkout::PaymentGateway for StubGateway {
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

    struct Fixture {
        orchestrator: PurchaseOrchestrator,
        clock: ManualClock,
        store: Arc<EntitlementStore>,
        gateway: Arc<StubGateway>,
        events: broadcast::Receiver<EngineEvent>,
    }

    fn fixture() -> Fixture {
        fixture_with(false, false)
    }

    fn fixture_with(rate_fails: bool, gateway_fails: bool) -> Fixture {
        let clock = ManualClock::at_epoch();
        let provider = Arc::new(FixedRate {
            rate: 83.0,
            fail: rate_fails,
            calls: AtomicU32::new(0),
        });
        let gateway = Arc::new(StubGateway {
            orders: AtomicU64::new(0),
            fail: gateway_fails,
        });
        let cache = Arc::new(RateCache::new(
            provider,
            Arc::new(clock.clone()),
            Duration::hours(1),
        ));
        let orders = OrderBuilder::new(
            cache,
            gateway.clone(),
            Arc::new(clock.clone()),
            "INR",
        );
        let store = Arc::new(EntitlementStore::new());
        let (events_tx, events_rx) = create_event_channel();

        let orchestrator = PurchaseOrchestrator::new(
            TierCatalog::standard(),
            orders,
            SignatureVerifier::new(Secret::new(SECRET)),
            store.clone(),
            AttemptRegistry::with_capacity(64),
            events_tx,
            Arc::new(clock.clone()),
        );
        Fixture {
            orchestrator,
            clock,
            store,
            gateway,
            events: events_rx,
        }
    }

    fn sign(order_id: &str, payment_id: &str) -> String {
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(SECRET.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn paid(order_id: &str) -> Transaction {
        Transaction {
            order_id: order_id.to_string(),
            payment_id: "pay_789".to_string(),
            signature: sign(order_id, "pay_789"),
        }
    }

    fn user() -> UserId {
        UserId::from("drizzle@example.com")
    }

    #[tokio::test]
    async fn begin_then_complete_grants_a_time_boxed_entitlement() {
        let f = fixture();

        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Basic, Term::Monthly)
            .await
            .expect("purchase opens");
        let outcome = f
            .orchestrator
            .complete(&paid(&ticket.order.id))
            .expect("completion processed");

        assert!(matches!(outcome, VerifyOutcome::Granted { .. }));
        let start = f.clock.now();
        assert!(f.store.is_active(&user(), Tier::Basic, start + Duration::days(15)));
        assert!(!f.store.is_active(&user(), Tier::Basic, start + Duration::days(31)));
    }

    #[tokio::test]
    async fn basic_monthly_ticket_charges_full_price() {
        let f = fixture();

        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Basic, Term::Monthly)
            .await
            .expect("purchase opens");

        assert_eq!(ticket.charge_usd, 5);
        // 5 USD * 83 = 415 local units = 41_500 minor units.
        assert_eq!(ticket.amount_local, 415);
        assert_eq!(ticket.order.amount_minor, 41_500);
        assert_eq!(ticket.checkout_key, "rzp_test_stub");
    }

    #[tokio::test]
    async fn upgrade_credits_active_basic() {
        let f = fixture();
        f.store
            .grant(&user(), Tier::Basic, Term::Monthly, f.clock.now());

        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Pro, Term::Monthly)
            .await
            .expect("purchase opens");

        assert_eq!(ticket.charge_usd, 5); // 10 - 5
    }

    #[tokio::test]
    async fn no_credit_once_basic_expired() {
        let f = fixture();
        f.store
            .grant(&user(), Tier::Basic, Term::Monthly, f.clock.now());
        f.clock.advance(Duration::days(31));

        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Pro, Term::Monthly)
            .await
            .expect("purchase opens");

        assert_eq!(ticket.charge_usd, 10);
    }

    #[tokio::test]
    async fn mismatched_signature_rejects_and_consumes_the_attempt() {
        let f = fixture();
        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Basic, Term::Monthly)
            .await
            .expect("purchase opens");

        let mut txn = paid(&ticket.order.id);
        txn.signature = sign(&ticket.order.id, "pay_someone_else");
        let outcome = f.orchestrator.complete(&txn).expect("completion processed");

        assert!(matches!(outcome, VerifyOutcome::Rejected { .. }));
        assert!(!f.store.is_active(&user(), Tier::Basic, f.clock.now()));

        // The attempt is gone: even a now-valid completion cannot grant.
        let retry = f
            .orchestrator
            .complete(&paid(&ticket.order.id))
            .expect("completion processed");
        assert!(matches!(retry, VerifyOutcome::Verified));
        assert!(!f.store.is_active(&user(), Tier::Basic, f.clock.now()));
    }

    #[tokio::test]
    async fn unknown_order_verifies_without_granting() {
        let f = fixture();

        let outcome = f
            .orchestrator
            .complete(&paid("order_external_1"))
            .expect("completion processed");

        assert!(matches!(outcome, VerifyOutcome::Verified));
        assert!(outcome.success());
        assert_eq!(f.store.user_count(), 0);
    }

    #[tokio::test]
    async fn malformed_report_errors_and_preserves_the_attempt() {
        let f = fixture();
        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Basic, Term::Monthly)
            .await
            .expect("purchase opens");

        let malformed = Transaction {
            order_id: ticket.order.id.clone(),
            payment_id: String::new(),
            signature: "deadbeef".to_string(),
        };
        let result = f.orchestrator.complete(&malformed);
        assert!(matches!(result, Err(Error::MalformedTransaction(_))));

        // A well-formed completion still lands.
        let outcome = f
            .orchestrator
            .complete(&paid(&ticket.order.id))
            .expect("completion processed");
        assert!(matches!(outcome, VerifyOutcome::Granted { .. }));
    }

    #[tokio::test]
    async fn second_completion_of_a_granted_order_grants_nothing_new() {
        let f = fixture();
        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Basic, Term::Monthly)
            .await
            .expect("purchase opens");
        let txn = paid(&ticket.order.id);

        let _ = f.orchestrator.complete(&txn).expect("first completion");
        let expiry_after_first = f
            .store
            .entitlements(&user())
            .get(Tier::Basic)
            .map(|e| e.expires_at);

        f.clock.advance(Duration::days(3));
        let second = f.orchestrator.complete(&txn).expect("second completion");

        assert!(matches!(second, VerifyOutcome::Verified));
        let expiry_after_second = f
            .store
            .entitlements(&user())
            .get(Tier::Basic)
            .map(|e| e.expires_at);
        assert_eq!(expiry_after_first, expiry_after_second);
    }

    #[tokio::test]
    async fn gateway_failure_registers_nothing() {
        let mut f = fixture_with(false, true);

        let result = f.orchestrator.begin(&user(), Tier::Basic, Term::Monthly).await;

        assert!(matches!(result, Err(Error::OrderCreationFailed(_))));
        assert_eq!(f.store.user_count(), 0);

        let mut saw_rejection = false;
        while let Ok(event) = f.events.try_recv() {
            if matches!(event, EngineEvent::PurchaseRejected { .. }) {
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);
    }

    #[tokio::test]
    async fn rate_outage_rejects_before_the_provider_is_called() {
        let f = fixture_with(true, false);

        let result = f.orchestrator.begin(&user(), Tier::Basic, Term::Monthly).await;

        assert!(matches!(result, Err(Error::RateUnavailable(_))));
        assert_eq!(f.gateway.orders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn events_trace_order_then_grant() {
        let mut f = fixture();

        let ticket = f
            .orchestrator
            .begin(&user(), Tier::Pro, Term::Annual)
            .await
            .expect("purchase opens");
        let _ = f
            .orchestrator
            .complete(&paid(&ticket.order.id))
            .expect("completion processed");

        let mut kinds = Vec::new();
        while let Ok(event) = f.events.try_recv() {
            kinds.push(event);
        }
        assert!(matches!(
            kinds.first(),
            Some(EngineEvent::OrderCreated { tier: Tier::Pro, .. })
        ));
        assert!(matches!(
            kinds.last(),
            Some(EngineEvent::PurchaseGranted { term: Term::Annual, .. })
        ));
    }

    #[test]
    fn states_advance_linearly_to_granted() {
        let mut attempt = PurchaseAttempt {
            user: user(),
            tier: Tier::Basic,
            term: Term::Monthly,
            charge_usd: 5,
            order_id: "order_1".to_string(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            state: PurchaseState::Requested,
        };

        assert!(attempt.advance(PurchaseState::OrderCreated));
        assert!(attempt.advance(PurchaseState::AwaitingCompletion));
        assert!(attempt.advance(PurchaseState::Verifying));
        assert!(attempt.advance(PurchaseState::Granted));
        assert!(attempt.state.is_terminal());
    }

    #[test]
    fn terminal_states_absorb() {
        for terminal in [PurchaseState::Granted, PurchaseState::Rejected] {
            for next in [
                PurchaseState::Requested,
                PurchaseState::OrderCreated,
                PurchaseState::AwaitingCompletion,
                PurchaseState::Verifying,
                PurchaseState::Granted,
                PurchaseState::Rejected,
            ] {
                assert!(!terminal.allows(next));
            }
        }
    }

    #[test]
    fn no_state_can_be_skipped_or_revisited() {
        assert!(!PurchaseState::Requested.allows(PurchaseState::Verifying));
        assert!(!PurchaseState::Requested.allows(PurchaseState::Granted));
        assert!(!PurchaseState::OrderCreated.allows(PurchaseState::Granted));
        assert!(!PurchaseState::AwaitingCompletion.allows(PurchaseState::Granted));
        assert!(!PurchaseState::AwaitingCompletion.allows(PurchaseState::Requested));
        assert!(!PurchaseState::Verifying.allows(PurchaseState::AwaitingCompletion));
    }
}
