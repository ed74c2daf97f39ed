//! Error types for the premium engine.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the premium engine.
///
/// Every purchase-path variant is terminal for the attempt that raised it.
/// A failed attempt never leaves partial entitlement state behind.
#[derive(Debug, Error)]
pub enum Error {
    /// The exchange-rate service could not produce a usable rate.
    #[error("exchange rate unavailable: {0}")]
    RateUnavailable(String),

    /// The requested charge is not a positive, finite amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The payment provider rejected or failed order creation.
    #[error("order creation failed: {0}")]
    OrderCreationFailed(String),

    /// The transaction signature does not match the expected HMAC.
    #[error("payment signature mismatch")]
    SignatureMismatch,

    /// The completed-payment payload is missing required fields.
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
