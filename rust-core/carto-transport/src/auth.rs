// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Request authentication: PSK-signed tokens or a renewable bearer token.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use carto_trust::psk::Claims;
use carto_trust::PskSigner;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderValue;

use crate::error::{Result, TransportError};

/// How requests prove who they come from.
pub(crate) enum Auth {
    None,
    /// Sign a fresh short-lived token for every request.
    Psk { signer: PskSigner, ttl: Duration },
    /// Send the stored header value; renewed in the background.
    Bearer(RwLock<HeaderValue>),
}

impl Auth {
    /// The `Authorization` value for the next request, if any.
    pub(crate) fn header_value(&self) -> Result<Option<HeaderValue>> {
        match self {
            Auth::None => Ok(None),
            Auth::Psk { signer, ttl } => {
                let bearer = signer
                    .bearer(&Claims::new(), *ttl)
                    .map_err(|e| TransportError::Token(e.to_string()))?;
                let mut value = HeaderValue::from_str(&bearer)
                    .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
                value.set_sensitive(true);
                Ok(Some(value))
            }
            Auth::Bearer(current) => Ok(Some(
                current.read().unwrap_or_else(PoisonError::into_inner).clone(),
            )),
        }
    }

    /// The current bearer header, in bearer mode only.
    pub(crate) fn bearer(&self) -> Option<HeaderValue> {
        match self {
            Auth::Bearer(current) => Some(current.read().unwrap_or_else(PoisonError::into_inner).clone()),
            _ => None,
        }
    }

    /// Replace the bearer header. No-op outside bearer mode.
    pub(crate) fn replace_bearer(&self, mut value: HeaderValue) {
        if let Auth::Bearer(current) = self {
            value.set_sensitive(true);
            *current.write().unwrap_or_else(PoisonError::into_inner) = value;
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Psk { .. } => "psk",
            Auth::Bearer(_) => "bearer",
        }
    }
}

/// Read the `exp` claim of a JWT, with or without a `Bearer ` prefix.
///
/// The signature is not checked: the client only needs to know when the
/// core will stop accepting the token.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::<Utc>::from_timestamp(exp, 0)
}

/// How long to sleep before renewing a token expiring at `expiry`.
pub(crate) fn renewal_delay(expiry: DateTime<Utc>, margin: Duration, now: DateTime<Utc>) -> Duration {
    let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::days(365_000));
    expiry
        .checked_sub_signed(margin)
        .and_then(|due| (due - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with_exp(exp: i64) -> String {
        let claims = json!({"exp": exp}).as_object().cloned().unwrap();
        PskSigner::new("k").sign(&claims, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_token_expiry_reads_exp() {
        let token = token_with_exp(1_900_000_000);
        assert_eq!(token_expiry(&token).unwrap().timestamp(), 1_900_000_000);
        assert_eq!(
            token_expiry(&format!("Bearer {token}")).unwrap().timestamp(),
            1_900_000_000
        );
    }

    #[test]
    fn test_token_without_exp() {
        let token = PskSigner::new("k").sign(&Claims::new(), Duration::ZERO).unwrap();
        assert!(token_expiry(&token).is_none());
        assert!(token_expiry("opaque-api-token").is_none());
    }

    #[test]
    fn test_renewal_delay() {
        let now = Utc::now();
        let expiry = now + chrono::Duration::minutes(10);
        let delay = renewal_delay(expiry, Duration::from_secs(300), now);
        assert_eq!(delay, Duration::from_secs(300));
        assert_eq!(renewal_delay(expiry, Duration::from_secs(3600), now), Duration::ZERO);
    }

    #[test]
    fn test_psk_header_is_fresh_bearer() {
        let auth = Auth::Psk {
            signer: PskSigner::new("secret"),
            ttl: Duration::from_secs(60),
        };
        let value = auth.header_value().unwrap().unwrap();
        let value = value.to_str().unwrap();
        assert!(value.starts_with("Bearer "));
        let claims = carto_trust::psk::decode_token(&value["Bearer ".len()..], "secret").unwrap();
        assert!(claims.contains_key("exp"));
    }

    #[test]
    fn test_replace_bearer() {
        let auth = Auth::Bearer(RwLock::new(HeaderValue::from_static("Bearer old")));
        auth.replace_bearer(HeaderValue::from_static("Bearer new"));
        assert_eq!(auth.bearer().unwrap(), "Bearer new");
        assert_eq!(auth.kind(), "bearer");
    }
}
