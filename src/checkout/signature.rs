//! HMAC-SHA256 verification of completed payments.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::Secret;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// A client-reported completed payment.
///
/// Only the three identifiers matter. Any client-side "payment succeeded"
/// flag is ignored; the signature alone decides the verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Provider order identifier.
    pub order_id: String,
    /// Provider payment identifier.
    pub payment_id: String,
    /// Hex HMAC-SHA256 the provider computed over the id pair.
    pub signature: String,
}

impl Transaction {
    /// Rejects transactions with missing fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTransaction`] naming the first empty
    /// field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("order_id", &self.order_id),
            ("payment_id", &self.payment_id),
            ("signature", &self.signature),
        ] {
            if value.trim().is_empty() {
                return Err(Error::MalformedTransaction(format!("{field} is missing")));
            }
        }
        Ok(())
    }
}

/// Stateless verifier for provider payment signatures.
///
/// Holds only the signing secret, which never appears in logs, `Debug`
/// output, or return values.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Secret,
}

impl SignatureVerifier {
    /// Creates a verifier over the provider signing secret.
    #[must_use]
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// Checks `signature` against the expected HMAC for the id pair.
    ///
    /// The signed payload is `"{order_id}|{payment_id}"` and the expected
    /// signature is its lowercase hex HMAC-SHA256. Comparison is exact
    /// byte equality, so an uppercase rendering of the right digest does
    /// not verify.
    #[must_use]
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.reveal().as_bytes()) else {
            return false;
        };
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        expected == signature
    }

    /// [`Self::verify`] over a whole transaction.
    #[must_use]
    pub fn verify_transaction(&self, txn: &Transaction) -> bool {
        self.verify(&txn.order_id, &txn.payment_id, &txn.signature)
    }
}
