//! Request signature verification and response signing.
//!
//! Vendor calls carry `t=<unix_seconds>,v1=<hex>` in `x-f402-sig` (or the
//! legacy `x-flow402-signature`) plus a `x-f402-body-sha` body hash. The
//! digest is HMAC-SHA256 over `"{t}." + body`, which binds the signature to
//! both the timestamp and the exact wire bytes: neither can be replayed or
//! substituted independently. Comparison happens on the decoded digest bytes
//! in constant time.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Preferred signature header; the only one emitted on responses.
pub const SIGNATURE_HEADER: &str = "x-f402-sig";

/// Accepted on input for back-compat, never emitted.
pub const LEGACY_SIGNATURE_HEADER: &str = "x-flow402-signature";

/// Lowercase hex SHA-256 of the request body as received on the wire.
pub const BODY_SHA_HEADER: &str = "x-f402-body-sha";

/// Why a signature failed verification. Variant names are the wire-level
/// `reason` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header is missing")]
    MissingSignatureHeader,

    #[error("signature header is malformed")]
    InvalidSignatureFormat,

    #[error("signature timestamp is outside the accepted window")]
    TimestampOutOfWindow,

    #[error("body hash header is missing")]
    MissingBodyHash,

    #[error("body hash does not match the request body")]
    BodyHashMismatch,

    #[error("signature digest does not match")]
    SignatureMismatch,
}

impl SignatureError {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureError::MissingSignatureHeader => "missing_signature_header",
            SignatureError::InvalidSignatureFormat => "invalid_signature_format",
            SignatureError::TimestampOutOfWindow => "timestamp_out_of_window",
            SignatureError::MissingBodyHash => "missing_body_hash",
            SignatureError::BodyHashMismatch => "body_hash_mismatch",
            SignatureError::SignatureMismatch => "signature_mismatch",
        }
    }
}

/// Parsed `t=…,v1=…` header value.
#[derive(Debug)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Decoded digest bytes, always 32 (HMAC-SHA256 output size)
    pub digest: Vec<u8>,
}

/// Parse a `t=<decimal>,v1=<hex>` signature header value.
///
/// Pairs are comma-separated, order-independent, and whitespace-tolerant;
/// unknown pairs are ignored so the format can grow new versions.
pub fn parse_signature_header(value: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut digest = None;

    for pair in value.split(',') {
        let Some((key, val)) = pair.split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" => {
                timestamp = Some(
                    val.trim()
                        .parse::<i64>()
                        .map_err(|_| SignatureError::InvalidSignatureFormat)?,
                );
            }
            "v1" => {
                let bytes = hex::decode(val.trim())
                    .map_err(|_| SignatureError::InvalidSignatureFormat)?;
                if bytes.len() != 32 {
                    return Err(SignatureError::InvalidSignatureFormat);
                }
                digest = Some(bytes);
            }
            _ => {}
        }
    }

    match (timestamp, digest) {
        (Some(timestamp), Some(digest)) => Ok(SignatureHeader { timestamp, digest }),
        _ => Err(SignatureError::InvalidSignatureFormat),
    }
}

/// Lowercase hex SHA-256 of the given bytes.
pub fn body_sha256_hex(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Compute the HMAC-SHA256 digest over `"{timestamp}." + body` as lowercase hex.
///
/// Used both to sign outbound paywall envelopes and by tests to build valid
/// inbound signatures.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Full `t=…,v1=…` header value for an outbound signed response.
pub fn signature_header_value(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!("t={timestamp},v1={}", sign(secret, timestamp, body))
}

/// Verify an inbound request signature.
///
/// On success returns the signed timestamp; the caller keeps using the
/// already-buffered body and never re-reads it from the network.
pub fn verify(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
    now: i64,
    skew_secs: i64,
) -> Result<i64, SignatureError> {
    let raw = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(LEGACY_SIGNATURE_HEADER))
        .ok_or(SignatureError::MissingSignatureHeader)?
        .to_str()
        .map_err(|_| SignatureError::InvalidSignatureFormat)?;

    let parsed = parse_signature_header(raw)?;

    if (now - parsed.timestamp).abs() > skew_secs {
        return Err(SignatureError::TimestampOutOfWindow);
    }

    let claimed_sha = headers
        .get(BODY_SHA_HEADER)
        .ok_or(SignatureError::MissingBodyHash)?
        .to_str()
        .map_err(|_| SignatureError::BodyHashMismatch)?
        .trim()
        .to_ascii_lowercase();
    if claimed_sha != body_sha256_hex(body) {
        return Err(SignatureError::BodyHashMismatch);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    // verify_slice compares in constant time
    mac.verify_slice(&parsed.digest)
        .map_err(|_| SignatureError::SignatureMismatch)?;

    Ok(parsed.timestamp)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    const SECRET: &str = "demo-signing-secret";
    const BODY: &[u8] =
        br#"{"amount_credits":5,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#;
    const T: i64 = 1729200000;

    fn signed_headers(secret: &str, timestamp: i64, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&signature_header_value(secret, timestamp, body)).unwrap(),
        );
        headers.insert(
            BODY_SHA_HEADER,
            HeaderValue::from_str(&body_sha256_hex(body)).unwrap(),
        );
        headers
    }

    #[test]
    fn known_vector_digests_match() {
        assert_eq!(
            body_sha256_hex(BODY),
            "5a159b6e835fc4d107d0ffd630fe705c1a86c00ebf7d5dad7179ad912d249129"
        );
        assert_eq!(
            sign(SECRET, T, BODY),
            "6f65904bd1173ac13d5a79d2c038d7db7908513bf50e41509d964ff2ac924ac5"
        );
    }

    #[test]
    fn known_vector_verifies_inside_the_window() {
        let headers = signed_headers(SECRET, T, BODY);

        assert_eq!(verify(&headers, BODY, SECRET, T, 300), Ok(T));
        assert_eq!(verify(&headers, BODY, SECRET, T + 300, 300), Ok(T));
    }

    #[test]
    fn known_vector_expires_at_301_seconds() {
        let headers = signed_headers(SECRET, T, BODY);

        assert_eq!(
            verify(&headers, BODY, SECRET, T + 301, 300),
            Err(SignatureError::TimestampOutOfWindow)
        );
    }

    #[test]
    fn tampered_body_is_a_body_hash_mismatch() {
        let headers = signed_headers(SECRET, T, BODY);
        let tampered =
            br#"{"amount_credits":500,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#;

        assert_eq!(
            verify(&headers, tampered, SECRET, T, 300),
            Err(SignatureError::BodyHashMismatch)
        );
    }

    #[test]
    fn wrong_secret_is_a_signature_mismatch() {
        let headers = signed_headers("some-other-secret", T, BODY);

        assert_eq!(
            verify(&headers, BODY, SECRET, T, 300),
            Err(SignatureError::SignatureMismatch)
        );
    }

    #[test]
    fn legacy_header_name_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LEGACY_SIGNATURE_HEADER,
            HeaderValue::from_str(&signature_header_value(SECRET, T, BODY)).unwrap(),
        );
        headers.insert(
            BODY_SHA_HEADER,
            HeaderValue::from_str(&body_sha256_hex(BODY)).unwrap(),
        );

        assert_eq!(verify(&headers, BODY, SECRET, T, 300), Ok(T));
    }

    #[test]
    fn missing_headers_are_classified() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            verify(&headers, BODY, SECRET, T, 300),
            Err(SignatureError::MissingSignatureHeader)
        );

        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&signature_header_value(SECRET, T, BODY)).unwrap(),
        );
        assert_eq!(
            verify(&headers, BODY, SECRET, T, 300),
            Err(SignatureError::MissingBodyHash)
        );
    }

    #[test]
    fn uppercase_body_sha_is_normalized() {
        let mut headers = signed_headers(SECRET, T, BODY);
        let upper = body_sha256_hex(BODY).to_ascii_uppercase();
        headers.insert(BODY_SHA_HEADER, HeaderValue::from_str(&upper).unwrap());

        assert_eq!(verify(&headers, BODY, SECRET, T, 300), Ok(T));
    }

    #[test]
    fn parser_tolerates_whitespace_order_and_extra_pairs() {
        let digest = sign(SECRET, T, BODY);
        let value = format!(" v1 = {digest} , extra=1 , t = {T} ");
        let parsed = parse_signature_header(&value).unwrap();

        assert_eq!(parsed.timestamp, T);
        assert_eq!(parsed.digest, hex::decode(digest).unwrap());
    }

    #[test]
    fn parser_rejects_malformed_values() {
        let digest = sign(SECRET, T, BODY);

        // missing t
        assert!(matches!(
            parse_signature_header(&format!("v1={digest}")),
            Err(SignatureError::InvalidSignatureFormat)
        ));
        // missing v1
        assert!(parse_signature_header(&format!("t={T}")).is_err());
        // non-numeric timestamp
        assert!(parse_signature_header(&format!("t=abc,v1={digest}")).is_err());
        // non-hex digest
        assert!(parse_signature_header(&format!("t={T},v1=zzzz")).is_err());
        // truncated digest
        assert!(parse_signature_header(&format!("t={T},v1=deadbeef")).is_err());
    }

    #[test]
    fn sign_verify_round_trip() {
        let body = b"arbitrary body bytes";
        let headers = signed_headers(SECRET, 1_700_000_000, body);

        assert_eq!(
            verify(&headers, body, SECRET, 1_700_000_000, 300),
            Ok(1_700_000_000)
        );
    }
}
