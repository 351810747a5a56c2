// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Client configuration.
//!
//! [`ClientConfig`] is the one surface a caller fills in; the trust store and
//! transport configurations are derived from it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use carto_transport::TransportConfig;
use carto_trust::TrustConfig;
use serde::{Deserialize, Serialize};
use url::Url;

/// Graph used by graph-scoped calls unless the client is pointed elsewhere.
pub const DEFAULT_GRAPH: &str = "cartograph";

/// Connection settings for a [`Client`](crate::Client).
///
/// # Examples
///
/// ```rust
/// use carto_client::ClientConfig;
///
/// let config = ClientConfig::new("https://localhost:8900")
///     .with_psk("changeme")
///     .with_header("X-Team", "inventory");
/// assert_eq!(config.graph, "cartograph");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the core.
    pub url: String,
    /// Pre-shared key used to sign every request and to verify the CA proof.
    #[serde(skip_serializing)]
    pub psk: Option<String>,
    /// Static headers sent with every request. An `Authorization` entry
    /// switches to bearer authentication with automatic renewal.
    pub additional_headers: BTreeMap<String, String>,
    /// Trust this CA file instead of fetching the core's certificate.
    pub custom_ca_cert_path: Option<PathBuf>,
    /// Verify the core's TLS certificate.
    pub verify: bool,
    /// Refresh the CA certificate this long before it expires.
    pub renew_certificate_before: Duration,
    /// Renew a bearer token this long before it expires.
    pub renew_auth_token_before: Duration,
    /// Graph addressed by graph-scoped calls.
    pub graph: String,
    /// Overall per-request timeout.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost:8900".to_string(),
            psk: None,
            additional_headers: BTreeMap::new(),
            custom_ca_cert_path: None,
            verify: true,
            renew_certificate_before: Duration::from_secs(24 * 60 * 60),
            renew_auth_token_before: Duration::from_secs(5 * 60),
            graph: DEFAULT_GRAPH.to_string(),
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for the core at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Read `CARTO_CORE_URL`, `CARTO_PSK`, `CARTO_CA_CERT`, `CARTO_VERIFY`
    /// and `CARTO_GRAPH`, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("CARTO_CORE_URL") {
            config.url = url;
        }
        config.psk = std::env::var("CARTO_PSK").ok().filter(|psk| !psk.is_empty());
        config.custom_ca_cert_path = std::env::var_os("CARTO_CA_CERT").map(PathBuf::from);
        if let Some(verify) = std::env::var("CARTO_VERIFY").ok().and_then(|v| parse_flag(&v)) {
            config.verify = verify;
        }
        if let Ok(graph) = std::env::var("CARTO_GRAPH") {
            config.graph = graph;
        }
        config
    }

    /// Sign requests with `psk`.
    pub fn with_psk(mut self, psk: impl Into<String>) -> Self {
        self.psk = Some(psk.into());
        self
    }

    /// Send `name: value` with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.insert(name.into(), value.into());
        self
    }

    /// Authenticate with a bearer token instead of a PSK.
    pub fn with_bearer(self, token: &str) -> Self {
        let value = if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {token}")
        };
        self.with_header("Authorization", value)
    }

    /// Trust the CA certificate at `path`.
    pub fn with_custom_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_ca_cert_path = Some(path.into());
        self
    }

    /// Turn TLS verification on or off.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Reload the CA certificate this long before it expires.
    pub fn with_renew_certificate_before(mut self, before: Duration) -> Self {
        self.renew_certificate_before = before;
        self
    }

    /// Renew the bearer token this long before it expires.
    pub fn with_renew_auth_token_before(mut self, before: Duration) -> Self {
        self.renew_auth_token_before = before;
        self
    }

    /// Address `graph` in graph-scoped calls.
    pub fn with_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = graph.into();
        self
    }

    /// Give up on a request after `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Whether the CA certificate must be bootstrapped for this configuration.
    pub fn uses_trust_store(&self) -> bool {
        self.verify
            && Url::parse(&self.url)
                .map(|url| url.scheme() == "https")
                .unwrap_or(false)
    }

    /// Trust store settings derived from this configuration.
    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig {
            core_url: self.url.clone(),
            psk: self.psk.clone(),
            custom_ca_cert_path: self.custom_ca_cert_path.clone(),
            renew_before: self.renew_certificate_before,
            ..TrustConfig::default()
        }
    }

    /// Transport settings derived from this configuration.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.url.clone(),
            psk: self.psk.clone(),
            additional_headers: self.additional_headers.clone(),
            verify: self.verify,
            renew_auth_token_before: self.renew_auth_token_before,
            request_timeout: self.request_timeout,
            ..TransportConfig::default()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
