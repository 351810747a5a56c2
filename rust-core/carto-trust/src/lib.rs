// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Cartograph trust bootstrap.
//!
//! Obtains the core's CA certificate, authenticates it with a PSK-signed
//! fingerprint proof, turns it into a rustls client configuration and keeps
//! it fresh in the background.
//!
//! # Example
//!
//! ```no_run
//! use carto_trust::{TrustConfig, TrustStore};
//!
//! # async fn run() -> carto_trust::Result<()> {
//! let mut config = TrustConfig::new("https://localhost:8900");
//! config.psk = Some("changeme".into());
//!
//! let store = TrustStore::from_config(&config)?;
//! store.start().await?;
//! let tls = store.verification_context().await?;
//! # let _ = tls;
//! store.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod config;
pub mod error;
pub mod psk;
pub mod source;
pub mod store;
pub mod tls;

pub use certificate::{ca_bundle, fingerprint, CaCertificate};
pub use config::TrustConfig;
pub use error::{Result, TrustError};
pub use psk::{PskSigner, DEFAULT_TOKEN_TTL};
pub use source::{CertificateSource, FileSource, NetworkSource};
pub use store::{renewal_due, TrustSnapshot, TrustStore};
