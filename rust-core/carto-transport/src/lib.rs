// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Cartograph async transport.
//!
//! HTTP requests and WebSocket sessions against the core over one pooled
//! connection set, with:
//!
//! - a per-transport session id on every request,
//! - PSK-signed request tokens or a bearer token renewed ahead of expiry,
//! - TLS verification from a [`carto_trust::TrustStore`], and
//! - forward-only streaming of line-delimited JSON bodies.

#![forbid(unsafe_code)]

mod auth;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;
pub mod websocket;

pub use auth::token_expiry;
pub use config::{TransportConfig, MIN_TOKEN_RETRY_INTERVAL};
pub use error::{Result, TransportError};
pub use request::{Body, HttpRequest, NDJSON};
pub use response::{ContentKind, HttpResponse, LineSplitter, LineStream};
pub use transport::{generate_session_id, AsyncTransport, RENEW_PATH};
pub use websocket::{DuplexSession, Frame, Outgoing};
