//! Configuration for nimbus-premium.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// A sensitive string that never appears in `Debug` output.
///
/// Covers the exchange-rate API key and the payment-provider key secret.
/// Code that needs the raw value calls [`Secret::reveal`]; nothing in this
/// crate logs or serializes the value outside of config save.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a raw secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Whether the secret is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP surface binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Local currency orders are charged in (ISO 4217 code).
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Exchange-rate service configuration.
    #[serde(default)]
    pub rates: RateConfig,

    /// Payment-provider configuration.
    #[serde(default)]
    pub checkout: CheckoutConfig,

    /// Entitlement store configuration.
    #[serde(default)]
    pub entitlements: EntitlementConfig,
}

/// Exchange-rate service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Base URL of the exchange-rate API.
    #[serde(default = "default_rate_endpoint")]
    pub endpoint: String,

    /// API key for the exchange-rate service.
    #[serde(default)]
    pub api_key: Secret,

    /// Seconds a fetched rate stays fresh.
    #[serde(default = "default_rate_ttl_secs")]
    pub ttl_secs: u64,
}

/// Payment-provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Base URL of the provider's REST API.
    #[serde(default = "default_checkout_api_base")]
    pub api_base: String,

    /// Public key id, also handed to the client for checkout.
    #[serde(default)]
    pub key_id: String,

    /// Signing secret for order/payment verification.
    #[serde(default)]
    pub key_secret: Secret,

    /// Maximum pending purchase attempts held in memory.
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
}

/// Entitlement store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Seconds between sweeps of expired entitlements.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            currency: default_currency(),
            log_level: default_log_level(),
            rates: RateConfig::default(),
            checkout: CheckoutConfig::default(),
            entitlements: EntitlementConfig::default(),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rate_endpoint(),
            api_key: Secret::default(),
            ttl_secs: default_rate_ttl_secs(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            api_base: default_checkout_api_base(),
            key_id: String::new(),
            key_secret: Secret::default(),
            pending_capacity: default_pending_capacity(),
        }
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    // Same port the original dashboard backend served on.
    SocketAddr::from(([127, 0, 0, 1], 5001))
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rate_endpoint() -> String {
    "https://v6.exchangerate-api.com/v6".to_string()
}

const fn default_rate_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_checkout_api_base() -> String {
    "https://api.razorpay.com/v1".to_string()
}

const fn default_pending_capacity() -> usize {
    4096
}

const fn default_sweep_interval_secs() -> u64 {
    3600
}

impl RateConfig {
    /// Rate freshness window as a duration.
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
    }
}

impl ServiceConfig {
    /// Default configuration file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "nimbus-premium")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("nimbus-premium.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks that the credentials required to run are present.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the first missing field.
    pub fn validate(&self) -> crate::Result<()> {
        if self.rates.api_key.is_empty() {
            return Err(crate::Error::Config("rates.api_key is not set".to_string()));
        }
        if self.checkout.key_id.is_empty() {
            return Err(crate::Error::Config("checkout.key_id is not set".to_string()));
        }
        if self.checkout.key_secret.is_empty() {
            return Err(crate::Error::Config(
                "checkout.key_secret is not set".to_string(),
            ));
        }
        Ok(())
    }
}
