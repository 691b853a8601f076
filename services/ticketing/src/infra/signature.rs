//! Processor webhook signature check.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac-sha256>[,v1=...]`, signed over
//! `"{t}.{raw body}"`. Several `v1` entries may be present while the secret rotates.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Maximum age of a signed timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("signature header is missing")]
    MissingHeader,
    #[error("signature header is malformed")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("signature does not match")]
    Mismatch,
}

pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
    now: i64,
) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSecret)?;
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    let matched = signatures
        .iter()
        .any(|sig| bool::from(expected.as_slice().ct_eq(sig.as_slice())));
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
