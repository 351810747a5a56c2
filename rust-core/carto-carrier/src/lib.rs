// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Cartograph carrier thread.
//!
//! Hosts one single-threaded tokio scheduler on a dedicated OS thread and
//! lets ordinary blocking code run futures on it with
//! [`Carrier::submit_and_wait`]. Connection pools and background tasks
//! created by that work live on the carrier for its whole lifetime, so they
//! are shared across every blocking call in the process.

#![forbid(unsafe_code)]

mod carrier;
mod error;

pub use carrier::{Carrier, DEFAULT_DRAIN_TIMEOUT};
pub use error::{CarrierError, Result};
