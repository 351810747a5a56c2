// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The core's data model.

use carto_transport::HttpRequest;
use serde_json::Value;

use crate::client::Client;
use crate::error::Result;
use crate::types::{Kind, Model};

impl Client {
    /// Fetch the data model.
    pub async fn model(&self) -> Result<Model> {
        let value: Value = self.call_json(HttpRequest::get("/model")).await?;
        Model::from_value(value)
    }

    /// Add or change kinds and return the resulting model.
    pub async fn update_model(&self, kinds: &[Kind]) -> Result<Model> {
        let value: Value = self.call_json(HttpRequest::patch("/model").json(kinds)?).await?;
        Model::from_value(value)
    }
}
