// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Responses and line-delimited body streaming.
//!
//! Every body accessor consumes the [`HttpResponse`], so a body can be read
//! at most once and the connection returns to the pool when the response
//! (or its [`LineStream`]) is dropped.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, FusedStream, Stream};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Result, TransportError};
use crate::request::NDJSON;

/// Body kinds the core is known to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `text/plain`
    Text,
    /// `application/json`
    Json,
    /// `application/x-ndjson`
    NdJson,
}

impl ContentKind {
    /// Classify a `Content-Type` value; parameters after `;` are ignored.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media_type.as_str() {
            "text/plain" => Ok(ContentKind::Text),
            "application/json" => Ok(ContentKind::Json),
            NDJSON => Ok(ContentKind::NdJson),
            _ => Err(TransportError::UnsupportedContentType(content_type.to_string())),
        }
    }
}

/// A response whose headers have arrived and whose body has not been read.
#[derive(Debug)]
pub struct HttpResponse {
    inner: reqwest::Response,
}

impl HttpResponse {
    pub(crate) fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Raw `Content-Type` header, if present and ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Classify the body by its `Content-Type`.
    pub fn content_kind(&self) -> Result<ContentKind> {
        match self.content_type() {
            Some(content_type) => ContentKind::from_content_type(content_type),
            None => Err(TransportError::UnsupportedContentType("<missing>".to_string())),
        }
    }

    /// Turn a non-success status into [`TransportError::Status`] carrying the body text.
    pub async fn error_for_status(self) -> Result<Self> {
        let status = self.status();
        if status.is_success() {
            return Ok(self);
        }
        let message = self.inner.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Read the whole body as text.
    pub async fn text(self) -> Result<String> {
        Ok(self.inner.text().await?)
    }

    /// Read and parse the whole body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.inner.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Vec<u8>> {
        Ok(self.inner.bytes().await?.to_vec())
    }

    /// Stream the body as non-blank lines, without their terminators.
    pub fn lines(self) -> LineStream {
        LineStream::new(
            self.inner
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
        )
    }

    /// Discard the body and return the connection to the pool.
    pub fn release(self) {
        drop(self.inner);
    }
}

/// Splits a byte stream into lines across arbitrary chunk boundaries.
///
/// Lines end at `\n`; a trailing `\r` is stripped and whitespace-only lines
/// are skipped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    /// An empty splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the lines it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.buffer.extend_from_slice(&rest[..pos]);
            let line = std::mem::take(&mut self.buffer);
            if let Some(line) = Self::clean(line) {
                lines.push(line);
            }
            rest = &rest[pos + 1..];
        }
        self.buffer.extend_from_slice(rest);
        lines
    }

    /// Flush an unterminated last line, if any.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        Self::clean(std::mem::take(&mut self.buffer))
    }

    fn clean(mut line: Vec<u8>) -> Option<Vec<u8>> {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(line)
        }
    }
}

/// Forward-only stream of body lines. Once exhausted it stays exhausted.
pub struct LineStream {
    body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    splitter: LineSplitter,
    ready: VecDeque<Vec<u8>>,
}

impl LineStream {
    fn new(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            body: Some(body),
            splitter: LineSplitter::new(),
            ready: VecDeque::new(),
        }
    }

    /// Parse every line as JSON.
    pub fn json<T: DeserializeOwned + Send + 'static>(self) -> BoxStream<'static, Result<T>> {
        self.map(|line| line.and_then(|line| Ok(serde_json::from_slice(&line)?)))
            .boxed()
    }
}

impl Stream for LineStream {
    type Item = Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            let Some(body) = this.body.as_mut() else {
                return Poll::Ready(None);
            };
            match body.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => this.ready.extend(this.splitter.push(&chunk)),
                Poll::Ready(Some(Err(err))) => {
                    this.body = None;
                    return Poll::Ready(Some(Err(err.into())));
                }
                Poll::Ready(None) => {
                    this.body = None;
                    this.ready.extend(this.splitter.finish());
                }
            }
        }
    }
}

impl FusedStream for LineStream {
    fn is_terminated(&self) -> bool {
        self.body.is_none() && self.ready.is_empty()
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("buffered", &self.ready.len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
