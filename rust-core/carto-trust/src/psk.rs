// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Pre-shared-key tokens.
//!
//! Both sides derive a 256-bit HMAC key from the PSK with PBKDF2-HMAC-SHA256
//! and a random salt. Tokens are HS256 JWTs whose header carries that salt in
//! a non-standard `salt` field (standard base64, padded), so the verifier can
//! re-derive the key.
//!
//! The core uses these tokens in two directions:
//! - the client signs a short-lived token for every request, and
//! - the core signs a proof of its CA certificate fingerprint on `/ca/cert`.

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Validation};
use rand::RngCore;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TrustError};

/// PBKDF2 iteration count shared with the core.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Default lifetime of a client-signed request token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

const ITERATIONS: NonZeroU32 = match NonZeroU32::new(PBKDF2_ITERATIONS) {
    Some(n) => n,
    None => panic!("PBKDF2 iteration count must be non-zero"),
};

/// JWT claim set.
pub type Claims = Map<String, Value>;

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
}

/// Derive the HMAC key for `psk` and `salt`.
pub fn derive_key(psk: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        ITERATIONS,
        salt,
        psk.as_bytes(),
        &mut key,
    );
    key
}

/// Signs tokens with one derived key.
///
/// Key derivation is deliberately slow, so a signer derives once and reuses
/// the key and salt for every token it issues. Each token still gets its own
/// `exp`.
#[derive(Clone)]
pub struct PskSigner {
    key: [u8; 32],
    salt: String,
}

impl PskSigner {
    /// Create a signer with a fresh random salt.
    pub fn new(psk: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(psk, &salt)
    }

    /// Create a signer with a caller-chosen salt.
    pub fn with_salt(psk: &str, salt: &[u8]) -> Self {
        Self {
            key: derive_key(psk, salt),
            salt: STANDARD.encode(salt),
        }
    }

    /// Sign `claims`. When `ttl` is non-zero and the claims carry no `exp`,
    /// one is added `ttl` from now.
    pub fn sign(&self, claims: &Claims, ttl: Duration) -> Result<String> {
        let mut claims = claims.clone();
        if !ttl.is_zero() && !claims.contains_key("exp") {
            let exp = Utc::now().timestamp().saturating_add(ttl.as_secs() as i64);
            claims.insert("exp".to_string(), Value::from(exp));
        }

        let header = TokenHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
            salt: Some(self.salt.clone()),
        };
        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = jsonwebtoken::crypto::sign(
            message.as_bytes(),
            &EncodingKey::from_secret(&self.key),
            Algorithm::HS256,
        )
        .map_err(|e| TrustError::Token(e.to_string()))?;

        Ok(format!("{message}.{signature}"))
    }

    /// `Bearer <token>` for an `Authorization` header.
    pub fn bearer(&self, claims: &Claims, ttl: Duration) -> Result<String> {
        Ok(format!("Bearer {}", self.sign(claims, ttl)?))
    }
}

impl fmt::Debug for PskSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskSigner")
            .field("salt", &self.salt)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Sign `claims` with a freshly salted key derived from `psk`.
pub fn encode_token(claims: &Claims, psk: &str, ttl: Duration) -> Result<String> {
    PskSigner::new(psk).sign(claims, ttl)
}

/// `Bearer <token>` signed with a freshly salted key derived from `psk`.
pub fn bearer_header(claims: &Claims, psk: &str, ttl: Duration) -> Result<String> {
    PskSigner::new(psk).bearer(claims, ttl)
}

/// Verify `token` against `psk` and return its claims.
///
/// `exp` is checked when present; tokens without one are accepted.
pub fn decode_token(token: &str, psk: &str) -> Result<Claims> {
    let header_segment = token
        .split('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| TrustError::InvalidProof("empty token".into()))?;
    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_segment)
        .map_err(|e| TrustError::InvalidProof(format!("malformed token header: {e}")))?;
    let header: TokenHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| TrustError::InvalidProof(format!("malformed token header: {e}")))?;
    let salt = header
        .salt
        .ok_or_else(|| TrustError::InvalidProof("token header carries no salt".into()))?;
    let salt = STANDARD
        .decode(salt)
        .map_err(|e| TrustError::InvalidProof(format!("malformed salt: {e}")))?;

    let key = derive_key(psk, &salt);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_aud = false;

    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&key), &validation)
        .map(|data| data.claims)
        .map_err(|e| TrustError::InvalidProof(e.to_string()))
}

/// Find a `Bearer` token in `headers` and verify it.
///
/// Returns `Ok(None)` when no bearer `Authorization` header is present.
pub fn decode_from_headers(headers: &HeaderMap, psk: &str) -> Result<Option<Claims>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|e| TrustError::InvalidProof(format!("non-ASCII authorization header: {e}")))?;
    match value.strip_prefix("Bearer ") {
        Some(token) => decode_token(token.trim(), psk).map(Some),
        None => Ok(None),
    }
}
