// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

use thiserror::Error;

/// Failures of the carrier itself, as opposed to failures of submitted work.
#[derive(Error, Debug)]
pub enum CarrierError {
    /// The carrier is not started, has been stopped, or its thread died.
    #[error("carrier thread is not running")]
    NotRunning,

    /// `start` was called after `stop`.
    #[error("carrier thread was stopped and cannot be restarted")]
    AlreadyStopped,

    /// Work was submitted from the carrier thread itself, which would deadlock.
    #[error("submit_and_wait called from the carrier thread")]
    Reentrant,

    /// The OS refused to spawn the thread.
    #[error("failed to spawn carrier thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The scheduler could not be built on the carrier thread.
    #[error("failed to start carrier runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Result alias for carrier operations.
pub type Result<T> = std::result::Result<T, CarrierError>;
