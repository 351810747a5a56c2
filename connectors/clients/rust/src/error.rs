// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Error types for the Cartograph client SDK.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, ClientError>`. Transport, carrier and trust errors
//! are wrapped unchanged so callers can match on the original failure.

use carto_carrier::CarrierError;
use carto_transport::TransportError;
use carto_trust::TrustError;
use thiserror::Error;

/// Error type for Cartograph client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request failed on the wire or the core answered with an error status.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The blocking facade could not run the call on its carrier thread.
    #[error(transparent)]
    Carrier(#[from] CarrierError),

    /// The core's CA certificate could not be loaded or verified.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// The core answered with a body that does not map to the expected model.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// HTTP status of a failed call, when the core answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport(err) => err.status(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Transport(TransportError::Json(err))
    }
}

/// Crate-level result alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;
