//! Webhook payload signing
//!
//! HMAC-SHA256 over the exact serialized request body, hex-encoded.
//! Receivers recompute the MAC over the raw bytes they received and
//! compare against the signature header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a received signature.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
