// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Configuration documents stored in the core, their model and validation.

use carto_transport::HttpRequest;
use serde_json::Value;

use crate::client::{Client, JsonStream};
use crate::error::Result;
use crate::types::{ConfigValidation, JsonObject, Kind, Model};

impl Client {
    // -- Documents ----------------------------------------------------------

    /// Stream the ids of all configurations.
    pub async fn configs(&self) -> Result<JsonStream> {
        self.call_stream(HttpRequest::get("/configs")).await
    }

    /// Configuration `config_id`.
    pub async fn config(&self, config_id: &str) -> Result<JsonObject> {
        self.call_json(HttpRequest::get(format!("/config/{config_id}"))).await
    }

    /// Replace configuration `config_id`. With `validate`, the core checks it
    /// against the configuration model first.
    pub async fn put_config(&self, config_id: &str, config: &JsonObject, validate: bool) -> Result<JsonObject> {
        let request = HttpRequest::put(format!("/config/{config_id}"))
            .query("validate", validate)
            .json(config)?;
        self.call_json(request).await
    }

    /// Merge `patch` into configuration `config_id`.
    pub async fn patch_config(&self, config_id: &str, patch: &JsonObject) -> Result<JsonObject> {
        self.call_json(HttpRequest::patch(format!("/config/{config_id}")).json(patch)?)
            .await
    }

    /// Delete configuration `config_id`.
    pub async fn delete_config(&self, config_id: &str) -> Result<()> {
        self.call_empty(HttpRequest::delete(format!("/config/{config_id}"))).await
    }

    // -- Model --------------------------------------------------------------

    /// The model configurations are validated against.
    pub async fn get_configs_model(&self) -> Result<Model> {
        let value: Value = self.call_json(HttpRequest::get("/configs/model")).await?;
        Model::from_value(value)
    }

    /// Add or replace kinds of the configuration model.
    pub async fn update_configs_model(&self, kinds: &[Kind]) -> Result<Model> {
        let value: Value = self
            .call_json(HttpRequest::patch("/configs/model").json(kinds)?)
            .await?;
        Model::from_value(value)
    }

    // -- Validation ---------------------------------------------------------

    /// Stream the ids of configurations with validation settings.
    pub async fn list_configs_validation(&self) -> Result<JsonStream> {
        self.call_stream(HttpRequest::get("/configs/validation")).await
    }

    /// Validation settings of `config_id`, or `None` if it has none.
    pub async fn get_config_validation(&self, config_id: &str) -> Result<Option<ConfigValidation>> {
        self.call_optional(HttpRequest::get(format!("/config/{config_id}/validation")))
            .await
    }

    /// Store the validation settings of `validation.id`.
    pub async fn put_config_validation(&self, validation: &ConfigValidation) -> Result<ConfigValidation> {
        let request = HttpRequest::put(format!("/config/{}/validation", validation.id)).json(validation)?;
        self.call_json(request).await
    }
}
