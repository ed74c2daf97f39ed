//! Payment and subscription entitlement engine for the Nimbus weather
//! dashboard.
//!
//! The engine sits between an untrusted browser client, an external payment
//! provider, and the server-side entitlement registry. It owns four concerns:
//!
//! - **Rate caching** ([`rates`]): USD to local-currency conversion through an
//!   external exchange-rate service, cached with a TTL.
//! - **Order building** ([`checkout`]): provider orders carrying converted
//!   amounts in minor units, plus HMAC-SHA256 verification of completed
//!   payments. Client-reported success flags are never trusted.
//! - **Entitlements** ([`entitlements`]): time-boxed, server-authoritative
//!   subscription state per user and tier, with tier implication (Pro covers
//!   Basic) and upgrade discounts.
//! - **Orchestration** ([`purchase`]): the purchase lifecycle from quote to
//!   grant, with every failure terminal and no partial writes.
//!
//! The [`service`] module assembles the production collaborators and serves
//! the HTTP surface defined in [`http`].
//!
//! ```no_run
//! use nimbus_premium::{ServiceBuilder, ServiceConfig};
//!
//! # async fn run() -> nimbus_premium::Result<()> {
//! let config = ServiceConfig::default();
//! let mut service = ServiceBuilder::new(config).build()?;
//! service.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod checkout;
pub mod clock;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod event;
pub mod http;
pub mod purchase;
pub mod rates;
pub mod service;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use purchase::PurchaseOrchestrator;
pub use service::{RunningService, ServiceBuilder};
