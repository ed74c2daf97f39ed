//! Payment-provider seam and its production REST client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CheckoutConfig, Secret};
use crate::error::{Error, Result};

/// An order as the provider reports it back.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderOrder {
    /// Provider-issued order identifier.
    pub id: String,
    /// Charge in minor currency units, echoed by the provider.
    pub amount: u64,
    /// ISO 4217 currency code, echoed by the provider.
    pub currency: String,
}

/// The payment provider, reduced to what the engine needs from it.
///
/// The provider is opaque: orders go in, an id comes back, and completed
/// payments are checked by signature rather than by asking the provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an order for `amount_minor` in `currency`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderCreationFailed`] when the provider rejects
    /// the order or cannot be reached.
    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder>;

    /// Public key id the client-side checkout widget is opened with.
    fn checkout_key(&self) -> &str;
}

/// Wire body of a Razorpay order-creation request.
#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
}

/// REST client for the Razorpay orders API.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: Secret,
}

impl RazorpayClient {
    /// Request timeout for the provider API.
    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client from the checkout configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: &CheckoutConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<ProviderOrder> {
        let url = format!("{}/orders", self.api_base);
        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt,
        };

        debug!(amount_minor, currency, "creating provider order");
        let response = self
            .http
            .post(url)
            .basic_auth(&self.key_id, Some(self.key_secret.reveal()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::OrderCreationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::OrderCreationFailed(format!(
                "provider answered {}",
                response.status()
            )));
        }

        response
            .json::<ProviderOrder>()
            .await
            .map_err(|e| Error::OrderCreationFailed(e.to_string()))
    }

    fn checkout_key(&self) -> &str {
        &self.key_id
    }
}
