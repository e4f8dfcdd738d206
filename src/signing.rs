//! TC3-HMAC-SHA256 request signing.
//!
//! Implements the platform's signature algorithm:
//!
//! 1. Create a canonical request
//! 2. Create the string to sign
//! 3. Derive the signing key through the date/service HMAC chain
//! 4. Produce the `Authorization` header value
//!
//! The signer is a pure function of its inputs: identical inputs always
//! yield an identical header, and the remote side re-derives the same
//! chain, so every step must be reproduced bit for bit.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// The signing algorithm identifier.
pub const ALGORITHM: &str = "TC3-HMAC-SHA256";

/// Only these two headers ever participate in the signature, even when
/// the real request carries more.
pub const SIGNED_HEADERS: &str = "content-type;host";

/// Final stage input of the key-derivation chain and scope suffix.
const REQUEST_SUFFIX: &str = "tc3_request";

/// Prefix of the root HMAC key.
const KEY_PREFIX: &str = "TC3";

/// TC3 request signer, bound to one credential pair and service.
#[derive(Debug, Clone)]
pub struct Tc3Signer {
    pub secret_id: String,
    pub secret_key: String,
    pub service: String,
}

impl Tc3Signer {
    pub fn new(secret_id: &str, secret_key: &str, service: &str) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            service: service.to_string(),
        }
    }

    /// Sign one request and return the `Authorization` header value.
    ///
    /// # Arguments
    /// * `method` - HTTP method ("POST" or "GET")
    /// * `host` - request hostname
    /// * `path` - URL path
    /// * `query` - raw query string without the leading `?`; ignored for
    ///   POST requests, which always sign an empty query
    /// * `body` - JSON body; `None` hashes the empty string
    /// * `timestamp` - unix timestamp in seconds, also sent as
    ///   `X-TC-Timestamp`
    pub fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query: &str,
        body: Option<&str>,
        timestamp: i64,
    ) -> String {
        let date = utc_date(timestamp);

        let content_type = if method == "GET" {
            "application/x-www-form-urlencoded"
        } else {
            "application/json"
        };
        let header_block = format!("content-type:{}\nhost:{}\n", content_type, host);

        // POST payloads travel in the body; the canonical query is empty
        // even if the URL object nominally has one.
        let canonical_query = if method == "POST" { "" } else { query };

        let payload_hash = sha256_hex(body.unwrap_or(""));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, header_block, SIGNED_HEADERS, payload_hash
        );

        let credential_scope = format!("{}/{}/{}", date, self.service, REQUEST_SUFFIX);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            timestamp,
            credential_scope,
            sha256_hex(&canonical_request)
        );

        let signing_key = self.derive_signing_key(&date);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.secret_id, credential_scope, SIGNED_HEADERS, signature
        )
    }

    /// Derive the signing key for a UTC calendar date.
    ///
    /// k_date    = HMAC-SHA256("TC3" + secret_key, date)
    /// k_service = HMAC-SHA256(k_date, service)
    /// k_signing = HMAC-SHA256(k_service, "tc3_request")
    ///
    /// Two requests issued on the same UTC day against the same service
    /// share this key.
    fn derive_signing_key(&self, date: &str) -> Vec<u8> {
        let k_secret = format!("{}{}", KEY_PREFIX, self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
        let k_service = hmac_sha256(&k_date, self.service.as_bytes());
        hmac_sha256(&k_service, REQUEST_SUFFIX.as_bytes())
    }
}

// ── Helper functions ────────────────────────────────────────────────────

/// Compute SHA-256 and return the hex-encoded digest.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// UTC calendar date (`YYYY-MM-DD`) of a unix timestamp, independent of
/// time of day.
pub fn utc_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}
