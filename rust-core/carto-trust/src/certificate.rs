// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The core's CA certificate and the metadata derived from it.
//!
//! A [`CaCertificate`] is immutable once parsed. Refreshes replace it
//! wholesale; nothing mutates a certificate in place.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};

use crate::error::{Result, TrustError};

/// A parsed CA certificate together with the fields the trust store needs.
#[derive(Debug, Clone)]
pub struct CaCertificate {
    der: CertificateDer<'static>,
    not_after: DateTime<Utc>,
    subject: String,
    issuer: String,
    label: String,
    serial: String,
    fingerprint: String,
}

impl CaCertificate {
    /// Parse the first certificate found in a PEM document.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let der = CertificateDer::from_pem_slice(pem)
            .map_err(|e| TrustError::Certificate(format!("invalid PEM: {e}")))?;
        Self::from_der(der)
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(der: CertificateDer<'static>) -> Result<Self> {
        let (not_after, subject, issuer, label, serial) = {
            let (_, parsed) = x509_parser::parse_x509_certificate(der.as_ref())
                .map_err(|e| TrustError::Certificate(format!("invalid X.509 certificate: {e}")))?;
            let timestamp = parsed.validity().not_after.timestamp();
            let not_after = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
                TrustError::Certificate(format!("not-after timestamp {timestamp} out of range"))
            })?;
            let issuer = parsed.issuer().to_string();
            let label = parsed
                .issuer()
                .iter_common_name()
                .find_map(|cn| cn.as_str().ok())
                .map_or_else(|| issuer.clone(), str::to_string);
            (
                not_after,
                parsed.subject().to_string(),
                issuer,
                label,
                parsed.raw_serial_as_string(),
            )
        };
        let fingerprint = fingerprint(der.as_ref());

        Ok(Self {
            der,
            not_after,
            subject,
            issuer,
            label,
            serial,
            fingerprint,
        })
    }

    /// The DER encoding, as handed to rustls.
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// The certificate's declared not-after time.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// RFC 4514 rendering of the subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// RFC 4514 rendering of the issuer.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Common name of the issuer, or the whole issuer when it has none.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Serial number as colon-separated hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// SHA-256 fingerprint over the DER bytes, `AB:CD:...` form.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// PEM encoding with 64-column base64 lines.
    pub fn to_pem(&self) -> String {
        let encoded = STANDARD.encode(self.der.as_ref());
        let mut pem = String::with_capacity(encoded.len() + encoded.len() / 64 + 64);
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        for line in encoded.as_bytes().chunks(64) {
            // base64 output is pure ASCII
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
        pem
    }
}

/// SHA-256 over `der`, rendered as upper-case hex octets joined by `:`.
pub fn fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Render the certificate as a commented PEM bundle entry.
///
/// The comment block follows the layout of public CA bundles so the cached
/// file can be inspected by hand.
pub fn ca_bundle(cert: &CaCertificate) -> String {
    let mut bundle = String::new();
    bundle.push('\n');
    bundle.push_str(&format!("# Issuer: {}\n", cert.issuer()));
    bundle.push_str(&format!("# Label: \"{}\"\n", cert.label()));
    bundle.push_str(&format!("# Subject: {}\n", cert.subject()));
    bundle.push_str(&format!("# Serial: {}\n", cert.serial()));
    bundle.push_str(&format!("# Not After: {}\n", cert.not_after().to_rfc3339()));
    bundle.push_str(&format!("# SHA256 Fingerprint: {}\n", cert.fingerprint()));
    bundle.push_str(&cert.to_pem());
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

    fn self_signed() -> rcgen::Certificate {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["core.local".to_string()]).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "cartograph root CA");
        params.not_after = rcgen::date_time_ymd(2031, 6, 1);
        params.self_signed(&key).unwrap()
    }

    #[test]
    fn test_parse_pem_extracts_metadata() {
        let cert = self_signed();
        let parsed = CaCertificate::from_pem(cert.pem().as_bytes()).unwrap();

        assert!(parsed.subject().contains("cartograph root CA"));
        assert_eq!(parsed.not_after().format("%Y-%m-%d").to_string(), "2031-06-01");
        assert_eq!(parsed.fingerprint(), fingerprint(cert.der()));
    }

    #[test]
    fn test_pem_round_trip_preserves_der() {
        let cert = self_signed();
        let parsed = CaCertificate::from_pem(cert.pem().as_bytes()).unwrap();
        let reparsed = CaCertificate::from_pem(parsed.to_pem().as_bytes()).unwrap();
        assert_eq!(reparsed.der().as_ref(), parsed.der().as_ref());
    }

    #[test]
    fn test_label_falls_back_to_issuer_without_common_name() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["core.local".to_string()]).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params.distinguished_name.push(DnType::OrganizationName, "Cartograph");
        let parsed = CaCertificate::from_pem(params.self_signed(&key).unwrap().pem().as_bytes()).unwrap();

        assert_eq!(parsed.label(), parsed.issuer());
        assert!(ca_bundle(&parsed).contains("# Label: \"O=Cartograph\"\n"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = CaCertificate::from_pem(b"not a certificate").unwrap_err();
        assert!(matches!(err, TrustError::Certificate(_)));
    }

    #[test]
    fn test_bundle_contains_comment_block_and_pem() {
        let cert = self_signed();
        let parsed = CaCertificate::from_pem(cert.pem().as_bytes()).unwrap();
        let bundle = ca_bundle(&parsed);
        assert!(bundle.contains("# Label: \"cartograph root CA\"\n"));
        assert!(bundle.contains("# SHA256 Fingerprint: "));
        assert!(bundle.contains(parsed.fingerprint()));
        assert!(bundle.contains("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_known_fingerprint_format() {
        // sha256("") = e3b0c442...
        let fp = fingerprint(b"");
        assert!(fp.starts_with("E3:B0:C4:42:"));
    }

    proptest! {
        #[test]
        fn test_fingerprint_shape(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let fp = fingerprint(&data);
            prop_assert_eq!(fp.len(), 32 * 3 - 1);
            prop_assert!(fp.split(':').all(|octet| octet.len() == 2
                && octet.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))));
        }
    }
}
