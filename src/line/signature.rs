//! Webhook signature verification.
//!
//! LINE signs each webhook body with HMAC-SHA256 keyed by the channel secret
//! and sends the base64 digest in `X-Line-Signature`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::line::error::{LineError, LineResult};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(channel_secret: &str, body: &[u8]) -> LineResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .map_err(|_| LineError::InvalidSignature)?;
    mac.update(body);
    Ok(mac)
}

/// Compute the signature LINE would send for `body`.
///
/// # Errors
/// Returns an error if the secret cannot key the MAC.
pub fn sign(channel_secret: &str, body: &[u8]) -> LineResult<String> {
    let mac = mac_for(channel_secret, body)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check `signature` against `body` in constant time.
///
/// # Errors
/// Returns [`LineError::InvalidSignature`] if the header is not base64 or does
/// not match.
pub fn verify(channel_secret: &str, body: &[u8], signature: &str) -> LineResult<()> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| LineError::InvalidSignature)?;
    mac_for(channel_secret, body)?
        .verify_slice(&expected)
        .map_err(|_| LineError::InvalidSignature)
}
