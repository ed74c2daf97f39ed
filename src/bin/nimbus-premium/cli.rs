//! Command-line interface definition.

use clap::Parser;
use nimbus_premium::config::Secret;
use nimbus_premium::ServiceConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Payment and subscription entitlement engine for the Nimbus weather dashboard.
#[derive(Parser, Debug)]
#[command(name = "nimbus-premium")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, short, env = "NIMBUS_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Local currency orders are charged in.
    #[arg(long, env = "NIMBUS_CURRENCY")]
    pub currency: Option<String>,

    /// Exchange-rate service API key.
    #[arg(long, env = "NIMBUS_RATE_API_KEY")]
    pub rate_api_key: Option<String>,

    /// Exchange-rate service base URL.
    #[arg(long, env = "NIMBUS_RATE_ENDPOINT")]
    pub rate_endpoint: Option<String>,

    /// Seconds a fetched exchange rate stays fresh.
    #[arg(long, env = "NIMBUS_RATE_TTL_SECS")]
    pub rate_ttl_secs: Option<u64>,

    /// Payment provider key id (public, embedded in checkout pages).
    #[arg(long, env = "NIMBUS_CHECKOUT_KEY_ID")]
    pub checkout_key_id: Option<String>,

    /// Payment provider key secret.
    #[arg(long, env = "NIMBUS_CHECKOUT_KEY_SECRET")]
    pub checkout_key_secret: Option<String>,

    /// Payment provider API base URL.
    #[arg(long, env = "NIMBUS_CHECKOUT_API_BASE")]
    pub checkout_api_base: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments into a ServiceConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<ServiceConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServiceConfig::from_file(path)?
        } else {
            ServiceConfig::default()
        };

        // Override with CLI arguments
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(currency) = self.currency {
            config.currency = currency;
        }
        if let Some(key) = self.rate_api_key {
            config.rates.api_key = Secret::new(key);
        }
        if let Some(endpoint) = self.rate_endpoint {
            config.rates.endpoint = endpoint;
        }
        if let Some(ttl) = self.rate_ttl_secs {
            config.rates.ttl_secs = ttl;
        }
        if let Some(key_id) = self.checkout_key_id {
            config.checkout.key_id = key_id;
        }
        if let Some(secret) = self.checkout_key_secret {
            config.checkout.key_secret = Secret::new(secret);
        }
        if let Some(api_base) = self.checkout_api_base {
            config.checkout.api_base = api_base;
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}
