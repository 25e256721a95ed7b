use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Webhook Signatures
// =============================================================================

/// Reasons a webhook delivery is rejected (logged, never shown to the sender)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    MalformedHeader,
    StaleTimestamp,
    Mismatch,
}

/// Compute hex-encoded HMAC-SHA256 of `data`
pub fn sign_hmac(data: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(data);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a Stripe-style webhook signature header
///
/// Header format: `t=<unix seconds>,v1=<hex signature>[,v1=<hex signature>...]`.
/// The signed payload is `<t>.<raw body>`; any `v1` entry may match (Stripe
/// sends several while a secret is being rolled).
///
/// # Arguments
/// * `payload` - The raw request body, byte for byte
/// * `header` - Value of the `Stripe-Signature` header
/// * `secret` - The endpoint's signing secret
/// * `now` - Current unix time in seconds
/// * `tolerance_secs` - Maximum accepted distance between `t` and `now`
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;
    if !validate_timestamp(issued_at, now, tolerance_secs) {
        return Err(SignatureError::StaleTimestamp);
    }

    let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed_payload.extend_from_slice(timestamp.as_bytes());
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    let expected = sign_hmac(&signed_payload, secret).ok_or(SignatureError::Mismatch)?;

    let matched = signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Validate timestamp is within acceptable range of `now`
///
/// Prevents replay of captured deliveries.
pub fn validate_timestamp(timestamp: i64, now: i64, max_age_secs: i64) -> bool {
    let age_seconds = (now - timestamp).abs();

    if age_seconds > max_age_secs {
        tracing::warn!(
            "Timestamp out of range: {} seconds (max: {})",
            age_seconds,
            max_age_secs
        );
        return false;
    }

    true
}

// =============================================================================
// Bearer Tokens
// =============================================================================

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }

    Some(token)
}
