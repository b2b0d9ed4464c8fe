use {
    crate::domain::error::PaymentError,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

/// Verify a hex HMAC-SHA256 of `body` under `secret`.
///
/// Accepts an optional `sha256=` prefix. The comparison is constant-time
/// (`Mac::verify_slice`).
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> Result<(), PaymentError> {
    let hex_sig = signature.trim();
    let hex_sig = hex_sig.strip_prefix("sha256=").unwrap_or(hex_sig);
    let expected = hex::decode(hex_sig)
        .map_err(|_| PaymentError::WebhookSignature("signature is not valid hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
}

/// Hex HMAC-SHA256 of `body`; the value a sender puts in the signature header.
pub fn sign(body: &[u8], secret: &str) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::WebhookSignature(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
