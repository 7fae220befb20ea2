//! Webhook authenticity check.
//!
//! The provider signs the raw request body with HMAC-SHA512 keyed by the
//! merchant secret and sends the lowercase hex digest in a header. The bytes
//! hashed here must be the bytes received; re-serialising parsed JSON changes
//! key order and whitespace and breaks verification.

use crate::payments::error::{PaymentError, PaymentResult};
use hmac::{Hmac, Mac};
use sha2::Sha512;

type HmacSha512 = Hmac<Sha512>;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Checks `signature` against the HMAC of `payload`, comparing in
    /// constant time.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> PaymentResult<()> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::WebhookVerificationError {
                message: "missing signature header".to_string(),
            })?;

        let expected = hex::decode(signature).map_err(|_| {
            PaymentError::WebhookVerificationError {
                message: "signature is not valid hex".to_string(),
            }
        })?;

        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| PaymentError::WebhookVerificationError {
                message: "signature mismatch".to_string(),
            })
    }

    /// Hex signature for `payload`. Used by tests and local tooling that
    /// replays provider callbacks.
    pub fn sign(&self, payload: &[u8]) -> PaymentResult<String> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> PaymentResult<HmacSha512> {
        HmacSha512::new_from_slice(self.secret.as_bytes()).map_err(|e| {
            PaymentError::WebhookVerificationError {
                message: format!("invalid webhook secret: {}", e),
            }
        })
    }
}
