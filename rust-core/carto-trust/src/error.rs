// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Error types for the trust bootstrap.
//!
//! Every way the initial CA load can fail is a [`TrustError`] variant. The
//! same errors are produced by background refreshes, where they are logged
//! instead of propagated.

use thiserror::Error;
use tracing::error;

/// Failures while fetching, verifying, or installing the core's CA certificate.
#[derive(Error, Debug)]
pub enum TrustError {
    /// The certificate endpoint could not be reached or answered with an error status.
    #[error("CA certificate fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The signed proof names a different certificate than the one served.
    #[error("Invalid root CA certificate fingerprint: proof says {expected}, served certificate is {actual}")]
    FingerprintMismatch {
        /// Fingerprint carried in the signed proof.
        expected: String,
        /// Fingerprint computed locally over the served certificate.
        actual: String,
    },

    /// A pre-shared key is configured but the response carried no signed proof.
    #[error("CA certificate response carries no signed proof")]
    MissingProof,

    /// The signed proof is malformed, expired, or signed with another key.
    #[error("Invalid CA certificate proof: {0}")]
    InvalidProof(String),

    /// Token encoding failed.
    #[error("Token error: {0}")]
    Token(String),

    /// The certificate bytes are not a parseable PEM/X.509 certificate.
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// The TLS verification context could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// The base URL of the core is not a valid URL.
    #[error("Invalid core URL: {0}")]
    InvalidUrl(String),

    /// Reading a local CA file or writing the bundle cache failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of token segments failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrustError {
    /// Short operator hint for log lines, mirroring the likely cause.
    pub fn hint(&self) -> &'static str {
        match self {
            TrustError::FingerprintMismatch { .. } => "possible interception (MITM)?",
            TrustError::InvalidProof(_) => "wrong pre-shared key?",
            TrustError::MissingProof => "core started without a pre-shared key?",
            TrustError::Fetch(_) => "core unreachable?",
            _ => "",
        }
    }
}

/// Crate-level result alias using [`TrustError`].
pub type Result<T> = std::result::Result<T, TrustError>;

/// Log a trust failure at error level together with its hint.
pub(crate) fn log_failure(err: &TrustError, stage: &str) {
    error!(stage, error = %err, hint = err.hint(), "CA certificate load failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_mismatch_display() {
        let err = TrustError::FingerprintMismatch {
            expected: "AA:BB".into(),
            actual: "CC:DD".into(),
        };
        let message = format!("{err}");
        assert!(message.contains("AA:BB"));
        assert!(message.contains("CC:DD"));
        assert_eq!(err.hint(), "possible interception (MITM)?");
    }

    #[test]
    fn test_hints() {
        assert_eq!(TrustError::MissingProof.hint(), "core started without a pre-shared key?");
        assert_eq!(
            TrustError::InvalidProof("bad signature".into()).hint(),
            "wrong pre-shared key?"
        );
        assert_eq!(TrustError::Tls("x".into()).hint(), "");
    }
}
