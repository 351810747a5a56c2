// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Error types for the transport layer.

use carto_trust::TrustError;
use thiserror::Error;

/// Failures of an HTTP call or WebSocket session against the core.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection, protocol or body-read failure from `reqwest`.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The core answered with a non-success status.
    #[error("Core returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as sent by the core.
        message: String,
    },

    /// The response content type is not text, JSON or NDJSON.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// WebSocket handshake or frame failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL or a request path does not form a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configured or per-request header is not a valid HTTP header.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Signing a request token or renewing the bearer token failed.
    #[error("Token error: {0}")]
    Token(String),

    /// Reading a file for a multipart upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CA certificate could not be loaded for TLS verification.
    #[error(transparent)]
    Trust(#[from] TrustError),
}

impl TransportError {
    /// The HTTP status, when the core answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result alias using [`TransportError`].
pub type Result<T> = std::result::Result<T, TransportError>;
