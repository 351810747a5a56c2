// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Core CLI commands: evaluation, execution and command metadata.

use std::collections::BTreeMap;
use std::path::PathBuf;

use carto_transport::{ContentKind, HttpRequest, HttpResponse};
use futures::stream;
use serde_json::Value;

use crate::client::{lines_of, Client, JsonStream};
use crate::error::Result;
use crate::search::DEFAULT_SECTION;
use crate::types::{CliEvaluation, JsonObject, RawEvaluation};

/// Header carrying the command line when files are uploaded alongside it.
pub const SHELL_COMMAND_HEADER: &str = "Core-Shell-Command";

/// Options for [`Client::cli_execute`] and [`Client::cli_execute_raw`].
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Graph to run against; the client's graph when `None`.
    pub graph: Option<String>,
    /// Section paths are relative to; `reported` when `None`.
    pub section: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Files to upload, by form field name.
    pub files: BTreeMap<String, PathBuf>,
    /// Extra environment passed as query parameters.
    pub env: BTreeMap<String, String>,
}

impl CliOptions {
    /// Run against `graph` instead of the client's graph.
    pub fn graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Make paths relative to `section`.
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Upload `path` as form field `name`.
    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.insert(name.into(), path.into());
        self
    }

    /// Add an environment entry.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl Client {
    /// Parse `command` and report what would run, without running it.
    ///
    /// # Arguments
    ///
    /// * `command` - Command line, e.g. `search is(account) | count`.
    /// * `graph`   - Graph to evaluate against; the client's graph when `None`.
    /// * `env`     - Extra environment passed along with the graph and section.
    pub async fn cli_evaluate(
        &self,
        command: &str,
        graph: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> Result<Vec<CliEvaluation>> {
        let mut request = HttpRequest::post("/cli/evaluate")
            .query("graph", graph.unwrap_or(self.graph()))
            .query("section", DEFAULT_SECTION);
        for (key, value) in env {
            request = request.query(key.as_str(), value);
        }
        let raw: Vec<RawEvaluation> = self.call_json(request.text(command)).await?;
        Ok(raw.into_iter().map(CliEvaluation::from).collect())
    }

    /// Execute `command` and hand back the raw response, whatever its content.
    ///
    /// Without files the command is the text body. With files it travels in
    /// the [`SHELL_COMMAND_HEADER`] header of a multipart upload.
    pub async fn cli_execute_raw(&self, command: &str, options: &CliOptions) -> Result<HttpResponse> {
        let graph = options.graph.as_deref().unwrap_or(self.graph());
        let section = options.section.as_deref().unwrap_or(DEFAULT_SECTION);
        let mut request = HttpRequest::post("/cli/execute")
            .query("graph", graph)
            .query("section", section);
        for (key, value) in &options.env {
            request = request.query(key.as_str(), value);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = request.stream();
        request = if options.files.is_empty() {
            request.text(command)
        } else {
            request
                .header(SHELL_COMMAND_HEADER, command)
                .multipart(options.files.clone())
        };
        self.call(request).await
    }

    /// Execute `command` and stream its result.
    ///
    /// A text answer yields one string item, a JSON answer one item, and a
    /// line-delimited answer one item per line.
    ///
    /// # Errors
    ///
    /// Any other content type fails with
    /// [`TransportError::UnsupportedContentType`](carto_transport::TransportError::UnsupportedContentType);
    /// use [`cli_execute_raw`](Self::cli_execute_raw) for binary answers.
    pub async fn cli_execute(&self, command: &str, options: &CliOptions) -> Result<JsonStream> {
        let response = self.cli_execute_raw(command, options).await?;
        let kind = match response.content_kind() {
            Ok(kind) => kind,
            Err(err) => {
                response.release();
                return Err(err.into());
            }
        };
        let items: JsonStream = match kind {
            ContentKind::Text => {
                let text = response.text().await?;
                Box::pin(stream::once(async move { Ok(Value::String(text)) }))
            }
            ContentKind::Json => {
                let value: Value = response.json().await?;
                Box::pin(stream::once(async move { Ok(value) }))
            }
            ContentKind::NdJson => lines_of(response),
        };
        Ok(items)
    }

    /// Descriptions of all commands the core's CLI understands.
    pub async fn cli_info(&self) -> Result<JsonObject> {
        self.call_json(HttpRequest::get("/cli/info")).await
    }
}
