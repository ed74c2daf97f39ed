//! Checkout pipeline: provider orders and payment verification.

mod attempts;
mod order;
mod provider;
mod signature;

pub use attempts::{AttemptRegistry, RegistryStats};
pub use order::{Order, OrderBuilder, OrderQuote};
pub use provider::{PaymentGateway, ProviderOrder, RazorpayClient};
pub use signature::{SignatureVerifier, Transaction};
