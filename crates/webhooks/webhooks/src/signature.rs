//! HMAC signature generation and verification.
//!
//! The signature is the hex HMAC-SHA256 of the exact request body, sent in
//! [`SIGNATURE_HEADER`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{WebhookError, WebhookResult};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Webhook signer for generating and verifying signatures.
pub struct WebhookSigner {
    secret: String,
}

impl WebhookSigner {
    /// Creates a new signer with the given secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Generates the hex signature of a body.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies a signature against the body.
    pub fn verify(&self, signature: &str, body: &[u8]) -> bool {
        let expected = self.sign(body);
        constant_time_compare(&expected, signature.trim())
    }
}

/// Checks a received signature header against a body and secret.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> WebhookResult<()> {
    if WebhookSigner::new(secret).verify(header, body) {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

/// Generates a fresh signing secret.
pub fn generate_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
