// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Where the CA certificate comes from.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::certificate::CaCertificate;
use crate::error::{Result, TrustError};
use crate::psk;
use crate::tls;

/// Claim in the core's proof token that names the certificate fingerprint.
pub const FINGERPRINT_CLAIM: &str = "sha256_fingerprint";

/// Path of the CA bootstrap endpoint.
pub const CA_CERT_PATH: &str = "/ca/cert";

/// A provider of the core's CA certificate.
#[async_trait]
pub trait CertificateSource: Send + Sync + fmt::Debug {
    /// Obtain and verify the certificate.
    async fn fetch(&self) -> Result<CaCertificate>;

    /// Human-readable origin for log lines.
    fn describe(&self) -> String;

    /// Whether a background watcher should refresh this source.
    fn refreshable(&self) -> bool {
        true
    }
}

/// Fetches the CA from the core's bootstrap endpoint.
///
/// The request itself is made without TLS peer verification. When a PSK is
/// configured the response must carry a signed proof of the certificate
/// fingerprint, which is what authenticates the answer.
pub struct NetworkSource {
    endpoint: Url,
    psk: Option<String>,
    client: reqwest::Client,
}

impl NetworkSource {
    /// Source for the core at `core_url`.
    pub fn new(core_url: &str, psk: Option<String>) -> Result<Self> {
        let mut endpoint =
            Url::parse(core_url).map_err(|e| TrustError::InvalidUrl(format!("{core_url}: {e}")))?;
        endpoint.set_path(CA_CERT_PATH);
        endpoint.set_query(None);

        let client = reqwest::Client::builder()
            .use_preconfigured_tls((*tls::insecure_config()?).clone())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            endpoint,
            psk,
            client,
        })
    }

    /// The URL the certificate is fetched from.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl fmt::Debug for NetworkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkSource")
            .field("endpoint", &self.endpoint.as_str())
            .field("psk", &self.psk.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl CertificateSource for NetworkSource {
    async fn fetch(&self) -> Result<CaCertificate> {
        debug!(endpoint = %self.endpoint, "fetching CA certificate");
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await?
            .error_for_status()?;
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let cert = CaCertificate::from_pem(&body)?;

        if let Some(psk) = &self.psk {
            let claims = psk::decode_from_headers(&headers, psk)?.ok_or(TrustError::MissingProof)?;
            let expected = claims
                .get(FINGERPRINT_CLAIM)
                .and_then(|value| value.as_str())
                .ok_or_else(|| {
                    TrustError::InvalidProof(format!("proof carries no {FINGERPRINT_CLAIM} claim"))
                })?;
            if expected != cert.fingerprint() {
                return Err(TrustError::FingerprintMismatch {
                    expected: expected.to_string(),
                    actual: cert.fingerprint().to_string(),
                });
            }
            debug!(fingerprint = cert.fingerprint(), "CA certificate proof verified");
        }

        info!(
            subject = cert.subject(),
            not_after = %cert.not_after(),
            fingerprint = cert.fingerprint(),
            "CA certificate fetched"
        );
        Ok(cert)
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Reads the CA from a local PEM file. Never refreshed.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CertificateSource for FileSource {
    async fn fetch(&self) -> Result<CaCertificate> {
        let pem = tokio::fs::read(&self.path).await?;
        let cert = CaCertificate::from_pem(&pem)?;
        info!(path = %self.path.display(), subject = cert.subject(), "CA certificate loaded from file");
        Ok(cert)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn refreshable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_replaces_path_and_query() {
        let source = NetworkSource::new("https://core:8900/some/path?x=1", None).unwrap();
        assert_eq!(source.endpoint().as_str(), "https://core:8900/ca/cert");
    }

    #[test]
    fn test_invalid_url() {
        let err = NetworkSource::new("not a url", None).unwrap_err();
        assert!(matches!(err, TrustError::InvalidUrl(_)));
    }

    #[test]
    fn test_debug_redacts_psk() {
        let source = NetworkSource::new("https://core:8900", Some("hunter2".into())).unwrap();
        assert!(!format!("{source:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = FileSource::new("/nonexistent/ca.pem");
        assert!(!source.refreshable());
        assert!(matches!(source.fetch().await, Err(TrustError::Io(_))));
    }
}
