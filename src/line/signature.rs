use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing x-line-signature header")]
    MissingHeader,
    #[error("Signature is not valid base64")]
    InvalidEncoding,
    #[error("Signature does not match request body")]
    Mismatch,
}

fn mac_for(secret: &str, body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this can't fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
    mac.update(body);
    mac
}

/// Returns the base64 signature LINE would send for this body.
pub fn sign(secret: &str, body: &[u8]) -> String {
    general_purpose::STANDARD.encode(mac_for(secret, body).finalize().into_bytes())
}

/// Checks `signature` (the raw header value, if any) against the HMAC-SHA256 of
/// `body` keyed with the channel secret. Comparison is constant time.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingHeader)?;

    let expected = general_purpose::STANDARD
        .decode(signature)
        .map_err(|_| SignatureError::InvalidEncoding)?;

    mac_for(secret, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
