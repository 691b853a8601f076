//! Signs webhook bodies the way the payment processor does.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the processor signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Build a `t=<timestamp>,v1=<hex hmac>` header value for `payload`.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
