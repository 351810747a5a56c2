// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Request description handed to [`AsyncTransport::send`](crate::AsyncTransport::send).

use std::path::PathBuf;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Media type of line-delimited JSON.
pub const NDJSON: &str = "application/x-ndjson";

/// Request body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// JSON document, sent with the base `Content-Type: application/json`.
    Json(Value),
    /// Plain text, sent as `text/plain`.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Files uploaded as `multipart/form-data`, one part per `(name, path)`.
    Multipart(Vec<(String, PathBuf)>),
}

/// An HTTP request relative to the core's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}

impl HttpRequest {
    /// A request with `method` for `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH path`.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter when `value` is present.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Set a header for this request only, overriding any base header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Use `body` as the JSON request body.
    pub fn json_value(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    /// Send `body` as `text/plain`.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Text(body.into());
        self.header("Content-Type", "text/plain")
    }

    /// Send raw bytes.
    pub fn bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    /// Upload files as `multipart/form-data`.
    pub fn multipart(mut self, files: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        self.body = Body::Multipart(files.into_iter().collect());
        self
    }

    /// Ask for a line-delimited JSON response.
    pub fn stream(self) -> Self {
        self.header("Accept", NDJSON)
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request body.
    pub fn body(&self) -> &Body {
        &self.body
    }
}
