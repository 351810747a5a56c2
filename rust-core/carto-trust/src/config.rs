// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Trust store configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`TrustStore`](crate::TrustStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Base URL of the core, e.g. `https://localhost:8900`.
    pub core_url: String,
    /// Pre-shared key. When set, the CA certificate must come with a signed proof.
    #[serde(skip_serializing)]
    pub psk: Option<String>,
    /// Local CA certificate. When set, the network bootstrap and refresh are skipped.
    pub custom_ca_cert_path: Option<PathBuf>,
    /// Reload the certificate once it is this close to its not-after time.
    pub renew_before: Duration,
    /// How often the background watcher checks the expiry.
    pub check_interval: Duration,
    /// Also trust the standard public web roots.
    pub include_public_roots: bool,
    /// Write a PEM bundle here after every successful network load.
    pub bundle_cache_path: Option<PathBuf>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            core_url: "https://localhost:8900".to_string(),
            psk: None,
            custom_ca_cert_path: None,
            renew_before: Duration::from_secs(24 * 60 * 60),
            check_interval: Duration::from_secs(60),
            include_public_roots: true,
            bundle_cache_path: None,
        }
    }
}

impl TrustConfig {
    /// Configuration for `core_url` with defaults for everything else.
    pub fn new(core_url: impl Into<String>) -> Self {
        Self {
            core_url: core_url.into(),
            ..Self::default()
        }
    }

    /// Read `CARTO_CORE_URL`, `CARTO_PSK`, `CARTO_CA_CERT` and
    /// `CARTO_CA_BUNDLE_CACHE`, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("CARTO_CORE_URL") {
            config.core_url = url;
        }
        config.psk = std::env::var("CARTO_PSK").ok().filter(|psk| !psk.is_empty());
        config.custom_ca_cert_path = std::env::var_os("CARTO_CA_CERT").map(PathBuf::from);
        config.bundle_cache_path = std::env::var_os("CARTO_CA_BUNDLE_CACHE").map(PathBuf::from);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrustConfig::default();
        assert_eq!(config.renew_before, Duration::from_secs(86_400));
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert!(config.include_public_roots);
        assert!(config.psk.is_none());
    }

    #[test]
    fn test_psk_is_not_serialized() {
        let mut config = TrustConfig::new("https://core:8900");
        config.psk = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("https://core:8900"));
    }
}
