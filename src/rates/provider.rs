//! Exchange-rate provider seam and its production HTTP client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::{RateConfig, Secret};
use crate::error::{Error, Result};

/// Upstream source of the USD to local-currency rate.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetches the current conversion rate for one USD.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateUnavailable`] when the upstream service cannot
    /// produce a rate.
    async fn fetch_rate(&self) -> Result<f64>;
}

/// Response shape of the exchange-rate API's `latest` endpoint.
#[derive(Debug, Deserialize)]
struct LatestRates {
    conversion_rates: HashMap<String, f64>,
}

/// HTTP client for the exchangerate-api `latest/USD` endpoint.
///
/// The API key travels in the request path, so request URLs are never
/// logged.
#[derive(Debug, Clone)]
pub struct ExchangeRateClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Secret,
    target: String,
}

impl ExchangeRateClient {
    /// Request timeout for the rate service.
    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for `config`, quoting against `currency`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: &RateConfig, currency: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            target: currency.to_string(),
        })
    }
}

#[async_trait]
impl RateProvider for ExchangeRateClient {
    async fn fetch_rate(&self) -> Result<f64> {
        let url = format!("{}/{}/latest/USD", self.endpoint, self.api_key.reveal());

        debug!(target = %self.target, "fetching exchange rate");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::RateUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RateUnavailable(format!(
                "rate service answered {}",
                response.status()
            )));
        }

        let rates: LatestRates = response
            .json()
            .await
            .map_err(|e| Error::RateUnavailable(e.to_string()))?;

        rates
            .conversion_rates
            .get(&self.target)
            .copied()
            .ok_or_else(|| {
                Error::RateUnavailable(format!("no {} rate in provider response", self.target))
            })
    }
}
