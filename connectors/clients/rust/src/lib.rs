// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! # Cartograph Client SDK
//!
//! A Rust client library for the Cartograph core: graph and node management,
//! searches, merge batches, event subscribers, CLI execution, configuration
//! documents and the live event stream.
//!
//! Use [`Client`] from async code and [`BlockingClient`] everywhere else;
//! both expose the same methods. The blocking client runs every call on one
//! dedicated carrier thread.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use carto_client::{BlockingClient, ClientConfig};
//!
//! fn main() -> carto_client::Result<()> {
//!     let client = BlockingClient::new(ClientConfig::new("https://localhost:8900").with_psk("changeme"))?;
//!     println!("core says {}", client.ping()?);
//!     for graph in client.list_graphs()? {
//!         println!("graph: {graph}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`] - The async client and its shared request helpers.
//! - [`blocking`] - The blocking facade over a carrier thread.
//! - [`config`] - Connection settings.
//! - [`types`] - Model, merge counters, subscribers, parsed commands.
//! - [`model`], [`graph`], [`search`], [`subscribers`], [`cli`], [`configs`],
//!   [`system`], [`events`] - Domain operations.
//! - [`error`] - Error types and the crate-level `Result` alias.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blocking;
pub mod cli;
pub mod client;
pub mod config;
pub mod configs;
pub mod error;
pub mod events;
pub mod graph;
pub mod model;
pub mod search;
pub mod subscribers;
pub mod system;
pub mod types;

pub use blocking::{BlockingClient, BlockingResponse, BlockingStream};
pub use cli::{CliOptions, SHELL_COMMAND_HEADER};
pub use client::{Client, JsonStream};
pub use config::{ClientConfig, DEFAULT_GRAPH};
pub use error::{ClientError, Result};
pub use search::DEFAULT_SECTION;
pub use types::*;

pub use carto_transport::{ContentKind, Outgoing, TransportError};
