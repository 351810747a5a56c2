// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Liveness and readiness probes.

use carto_transport::HttpRequest;

use crate::client::Client;
use crate::error::Result;

impl Client {
    /// Ping the core. Answers `pong` when reachable.
    pub async fn ping(&self) -> Result<String> {
        self.call_text(HttpRequest::get("/system/ping")).await
    }

    /// Ask whether the core is ready to serve requests.
    pub async fn ready(&self) -> Result<String> {
        self.call_text(HttpRequest::get("/system/ready").header("Accept", "text/plain"))
            .await
    }
}
