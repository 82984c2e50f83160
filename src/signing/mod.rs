//! Request integrity
//!
//! Every mutating request carries an HMAC-SHA256 signature over
//! `METHOD|PATH|TIMESTAMP|NONCE|CANONICAL_BODY`, a timestamp that must fall
//! inside the TTL window, and a nonce that may be used once per TTL.

mod canonical;
mod nonce;

use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

use crate::store::StoreError;

pub use canonical::{canonical_json, canonicalize_body};
pub use nonce::{InMemoryNonceStore, NonceStore, PgNonceStore};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const SIGNATURE_VERSION_HEADER: &str = "x-signature-version";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const NONCE_HEADER: &str = "x-nonce";

/// The only signature scheme currently accepted
pub const SIGNATURE_VERSION: &str = "v1";

/// Request integrity failures
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Missing or malformed signature headers")]
    MissingSignatureHeaders,

    #[error("Unsupported signature version: {0}")]
    UnsupportedSignatureVersion(String),

    #[error("Request timestamp outside the accepted window")]
    RequestExpired,

    #[error("Nonce already used")]
    ReplayDetected,

    #[error("Invalid signature")]
    InvalidSignature,

    /// The nonce store could not be reached
    #[error("Nonce store error: {0}")]
    Store(#[from] StoreError),
}

/// Current time as epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Random 128-bit nonce, hex encoded
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Bytes covered by the signature
pub fn signing_payload(
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
) -> Vec<u8> {
    let mut payload = format!("{}|{}|{}|{}|", method, path, timestamp, nonce).into_bytes();
    payload.extend_from_slice(&canonicalize_body(body));
    payload
}

// =========================================================================
// Signing key
// =========================================================================

/// Keyed HMAC-SHA256 instance shared by signer and verifier
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    pub fn new(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    /// Hex-encoded signature of `payload`
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a hex signature
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }

    /// Produce the headers for a request, as a client would
    pub fn sign_request(
        &self,
        method: &str,
        path: &str,
        body: &[u8],
        timestamp: i64,
        nonce: &str,
    ) -> SignatureHeaders {
        let payload = signing_payload(method, path, timestamp, nonce, body);
        SignatureHeaders {
            signature: self.sign(&payload),
            version: SIGNATURE_VERSION.to_string(),
            timestamp,
            nonce: nonce.to_string(),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

// =========================================================================
// Headers
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub signature: String,
    pub version: String,
    pub timestamp: i64,
    pub nonce: String,
}

impl SignatureHeaders {
    /// Extract the four signature headers; any missing, empty or
    /// unparseable header is `MissingSignatureHeaders`
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, SignatureError> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or(SignatureError::MissingSignatureHeaders)
        };

        Ok(Self {
            signature: get(SIGNATURE_HEADER)?.to_string(),
            version: get(SIGNATURE_VERSION_HEADER)?.to_string(),
            timestamp: get(TIMESTAMP_HEADER)?
                .parse()
                .map_err(|_| SignatureError::MissingSignatureHeaders)?,
            nonce: get(NONCE_HEADER)?.to_string(),
        })
    }

    /// Header name/value pairs for an outgoing request
    pub fn to_pairs(&self) -> [(&'static str, String); 4] {
        [
            (SIGNATURE_HEADER, self.signature.clone()),
            (SIGNATURE_VERSION_HEADER, self.version.clone()),
            (TIMESTAMP_HEADER, self.timestamp.to_string()),
            (NONCE_HEADER, self.nonce.clone()),
        ]
    }
}

// =========================================================================
// Verifier
// =========================================================================

/// Verifies signed requests and consumes their nonces
#[derive(Clone)]
pub struct RequestVerifier {
    key: SigningKey,
    ttl_ms: i64,
    nonces: Arc<dyn NonceStore>,
}

impl RequestVerifier {
    pub fn new(key: SigningKey, ttl_ms: i64, nonces: Arc<dyn NonceStore>) -> Self {
        Self { key, ttl_ms, nonces }
    }

    /// Check version, freshness and signature, then claim the nonce.
    ///
    /// The nonce is only consumed once the signature is known good.
    pub async fn verify(
        &self,
        method: &str,
        path: &str,
        headers: &SignatureHeaders,
        body: &[u8],
        now_ms: i64,
    ) -> Result<(), SignatureError> {
        if headers.version != SIGNATURE_VERSION {
            return Err(SignatureError::UnsupportedSignatureVersion(
                headers.version.clone(),
            ));
        }

        if headers.timestamp.abs_diff(now_ms) > self.ttl_ms.unsigned_abs() {
            return Err(SignatureError::RequestExpired);
        }

        let payload = signing_payload(method, path, headers.timestamp, &headers.nonce, body);
        if !self.key.verify(&payload, &headers.signature) {
            return Err(SignatureError::InvalidSignature);
        }

        // Hold the nonce until the timestamp itself leaves the window
        let hold_ms = self.ttl_ms + headers.timestamp.saturating_sub(now_ms).max(0);
        if !self
            .nonces
            .check_and_set(&headers.nonce, now_ms, hold_ms)
            .await?
        {
            return Err(SignatureError::ReplayDetected);
        }

        Ok(())
    }
}

impl fmt::Debug for RequestVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestVerifier")
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TTL: i64 = 300_000;
    const NOW: i64 = 1_700_000_000_000;
    const PATH: &str = "/api/v1/transactions/debit";
    const BODY: &[u8] = br#"{"walletId":"w1","amount":100,"referenceId":"r1"}"#;

    fn verifier() -> (SigningKey, RequestVerifier) {
        let key = SigningKey::new(b"test-secret").unwrap();
        let verifier = RequestVerifier::new(key.clone(), TTL, Arc::new(InMemoryNonceStore::new()));
        (key, verifier)
    }

    #[tokio::test]
    async fn test_round_trip_accepts() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");

        verifier
            .verify("POST", PATH, &headers, BODY, NOW)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_key_order_in_body_does_not_break_signature() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");
        let reordered = br#"{"referenceId":"r1","amount":100,"walletId":"w1"}"#;

        assert!(verifier
            .verify("POST", PATH, &headers, reordered, NOW)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_single_byte_tamper_rejected() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");

        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            let result = verifier.verify("POST", PATH, &headers, &tampered, NOW).await;
            assert!(
                matches!(result, Err(SignatureError::InvalidSignature)),
                "tamper at byte {} accepted",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_method_and_path_are_signed_verbatim() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("post", PATH, BODY, NOW, "nonce-1");

        assert!(matches!(
            verifier.verify("POST", PATH, &headers, BODY, NOW).await,
            Err(SignatureError::InvalidSignature)
        ));
        assert!(matches!(
            verifier
                .verify("post", "/api/v1/transactions/credit", &headers, BODY, NOW)
                .await,
            Err(SignatureError::InvalidSignature)
        ));
        assert!(verifier.verify("post", PATH, &headers, BODY, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let (key, verifier) = verifier();
        let mut headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");
        let last = headers.signature.pop().unwrap();
        headers.signature.push(if last == '0' { '1' } else { '0' });

        assert!(matches!(
            verifier.verify("POST", PATH, &headers, BODY, NOW).await,
            Err(SignatureError::InvalidSignature)
        ));

        headers.signature = "not-hex".to_string();
        assert!(matches!(
            verifier.verify("POST", PATH, &headers, BODY, NOW).await,
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_path_and_method_are_signed() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");

        assert!(matches!(
            verifier
                .verify("POST", "/api/v1/transactions/credit", &headers, BODY, NOW)
                .await,
            Err(SignatureError::InvalidSignature)
        ));
        assert!(matches!(
            verifier.verify("PUT", PATH, &headers, BODY, NOW).await,
            Err(SignatureError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_expired_timestamp_rejected() {
        let (key, verifier) = verifier();
        let stale = key.sign_request("POST", PATH, BODY, NOW - TTL - 1, "nonce-1");
        assert!(matches!(
            verifier.verify("POST", PATH, &stale, BODY, NOW).await,
            Err(SignatureError::RequestExpired)
        ));

        let future = key.sign_request("POST", PATH, BODY, NOW + TTL + 1, "nonce-2");
        assert!(matches!(
            verifier.verify("POST", PATH, &future, BODY, NOW).await,
            Err(SignatureError::RequestExpired)
        ));

        let edge = key.sign_request("POST", PATH, BODY, NOW - TTL, "nonce-3");
        assert!(verifier.verify("POST", PATH, &edge, BODY, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_replay_rejected_then_allowed_after_ttl() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");

        verifier.verify("POST", PATH, &headers, BODY, NOW).await.unwrap();
        assert!(matches!(
            verifier.verify("POST", PATH, &headers, BODY, NOW + 10).await,
            Err(SignatureError::ReplayDetected)
        ));

        // Same nonce on a fresh request once the first claim has lapsed
        let later = NOW + TTL + 1;
        let fresh = key.sign_request("POST", PATH, BODY, later, "nonce-1");
        assert!(verifier.verify("POST", PATH, &fresh, BODY, later).await.is_ok());
    }

    #[tokio::test]
    async fn test_future_timestamp_holds_nonce_for_whole_window() {
        let (key, verifier) = verifier();
        let headers = key.sign_request("POST", PATH, BODY, NOW + TTL, "nonce-1");

        verifier.verify("POST", PATH, &headers, BODY, NOW).await.unwrap();
        // Timestamp is still fresh here, so the nonce must still be held
        assert!(matches!(
            verifier.verify("POST", PATH, &headers, BODY, NOW + TTL + 1).await,
            Err(SignatureError::ReplayDetected)
        ));
    }

    #[tokio::test]
    async fn test_bad_signature_does_not_burn_nonce() {
        let (key, verifier) = verifier();
        let mut forged = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");
        forged.signature = "00".repeat(32);
        assert!(verifier.verify("POST", PATH, &forged, BODY, NOW).await.is_err());

        let genuine = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");
        assert!(verifier.verify("POST", PATH, &genuine, BODY, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let (key, verifier) = verifier();
        let mut headers = key.sign_request("POST", PATH, BODY, NOW, "nonce-1");
        headers.version = "v2".to_string();
        assert!(matches!(
            verifier.verify("POST", PATH, &headers, BODY, NOW).await,
            Err(SignatureError::UnsupportedSignatureVersion(v)) if v == "v2"
        ));
    }

    #[test]
    fn test_header_extraction() {
        let mut map = HeaderMap::new();
        map.insert(SIGNATURE_HEADER, HeaderValue::from_static("abcd"));
        map.insert(SIGNATURE_VERSION_HEADER, HeaderValue::from_static("v1"));
        map.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000000"));
        assert!(matches!(
            SignatureHeaders::from_headers(&map),
            Err(SignatureError::MissingSignatureHeaders)
        ));

        map.insert(NONCE_HEADER, HeaderValue::from_static("n"));
        let parsed = SignatureHeaders::from_headers(&map).unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000_000);

        map.insert(TIMESTAMP_HEADER, HeaderValue::from_static("yesterday"));
        assert!(matches!(
            SignatureHeaders::from_headers(&map),
            Err(SignatureError::MissingSignatureHeaders)
        ));
    }

    #[test]
    fn test_generated_nonces_are_unique() {
        assert_ne!(generate_nonce(), generate_nonce());
        assert_eq!(generate_nonce().len(), 32);
    }
}
