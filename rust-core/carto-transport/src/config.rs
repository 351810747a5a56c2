// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shortest wait between bearer renewal attempts; smaller settings are raised to it.
pub const MIN_TOKEN_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for an [`AsyncTransport`](crate::AsyncTransport).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the core.
    pub base_url: String,
    /// Pre-shared key; every request then carries a freshly signed token.
    #[serde(skip_serializing)]
    pub psk: Option<String>,
    /// Static headers sent with every request. An `Authorization` entry here
    /// enables bearer mode (ignored when a PSK is set).
    pub additional_headers: BTreeMap<String, String>,
    /// Verify the core's TLS certificate.
    pub verify: bool,
    /// Renew a bearer token this long before its `exp`.
    pub renew_auth_token_before: Duration,
    /// Wait between failed renewal attempts, at least [`MIN_TOKEN_RETRY_INTERVAL`].
    pub token_retry_interval: Duration,
    /// Lifetime of PSK request tokens.
    pub psk_token_ttl: Duration,
    /// Overall per-request timeout. `None` keeps reqwest's default (none).
    pub request_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8900".to_string(),
            psk: None,
            additional_headers: BTreeMap::new(),
            verify: true,
            renew_auth_token_before: Duration::from_secs(5 * 60),
            token_retry_interval: Duration::from_secs(10),
            psk_token_ttl: Duration::from_secs(300),
            request_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Configuration for `base_url` with defaults for everything else.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
