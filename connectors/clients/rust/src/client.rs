// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The async Cartograph client.
//!
//! [`Client`] owns the transport and, for verified HTTPS connections, the
//! trust store. Domain methods (model, graph, search, ...) are defined as
//! `impl Client` blocks in their respective modules and delegate to the
//! helpers at the bottom of this file.

use std::pin::Pin;
use std::sync::Arc;

use carto_transport::{AsyncTransport, HttpRequest, HttpResponse};
use carto_trust::TrustStore;
use futures::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, Dispatch};

use crate::config::ClientConfig;
use crate::error::Result;

/// A forward-only stream of JSON items from the core.
pub type JsonStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

const NOT_FOUND: u16 = 404;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The Cartograph client.
///
/// Cloning is cheap: clones share the connection pool, session, token and
/// trust store.
///
/// # Examples
///
/// ```rust,no_run
/// use carto_client::{Client, ClientConfig};
///
/// # #[tokio::main]
/// # async fn main() -> carto_client::Result<()> {
/// let client = Client::new(ClientConfig::new("https://localhost:8900").with_psk("changeme"))?;
/// client.start().await?;
/// println!("{}", client.ping().await?);
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    transport: AsyncTransport,
    trust: Option<TrustStore>,
    graph: Arc<str>,
}

impl Client {
    // -- Constructors -------------------------------------------------------

    /// Build a client logging to the current default dispatcher.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        Self::with_dispatch(config, dispatch)
    }

    /// Build a client whose components, and their background tasks, log to `dispatch`.
    pub fn with_dispatch(config: ClientConfig, dispatch: Dispatch) -> Result<Self> {
        let trust = if config.uses_trust_store() {
            let trust_config = config.trust_config();
            Some(tracing::dispatcher::with_default(&dispatch, || {
                TrustStore::from_config(&trust_config)
            })?)
        } else {
            None
        };
        let transport = AsyncTransport::with_dispatch(&config.transport_config(), trust.clone(), dispatch)?;
        Ok(Self {
            transport,
            trust,
            graph: Arc::from(config.graph.as_str()),
        })
    }

    /// A client sharing this one's connection and session but addressing `graph`.
    pub fn on_graph(&self, graph: &str) -> Self {
        Self {
            transport: self.transport.clone(),
            trust: self.trust.clone(),
            graph: Arc::from(graph),
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Load the CA certificate (when verifying HTTPS) and arm the background
    /// refresh and token renewal tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Trust`](crate::ClientError::Trust) when the
    /// initial certificate load fails.
    pub async fn start(&self) -> Result<()> {
        if let Some(trust) = &self.trust {
            trust.start().await?;
        }
        self.transport.start();
        debug!(session = %self.transport.session_id(), "client started");
        Ok(())
    }

    /// Stop every background task and close open event sessions. Idempotent.
    pub async fn shutdown(&self) {
        self.transport.shutdown();
        if let Some(trust) = &self.trust {
            trust.shutdown().await;
        }
    }

    // -- Accessors ----------------------------------------------------------

    /// The graph addressed by graph-scoped calls.
    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Session identifier sent with every request.
    pub fn session_id(&self) -> &str {
        self.transport.session_id()
    }

    /// The underlying transport, for calls this client does not wrap.
    pub fn transport(&self) -> &AsyncTransport {
        &self.transport
    }

    /// The trust store, when the connection is verified HTTPS.
    pub fn trust(&self) -> Option<&TrustStore> {
        self.trust.as_ref()
    }

    // -- Internal helpers ---------------------------------------------------

    /// `/graph/{graph}{suffix}` for the current graph.
    pub(crate) fn graph_path(&self, suffix: &str) -> String {
        format!("/graph/{}{suffix}", self.graph)
    }

    /// Send `request`, requiring a success status.
    pub(crate) async fn call(&self, request: HttpRequest) -> Result<HttpResponse> {
        Ok(self.transport.call(request).await?)
    }

    /// Send `request` and decode the JSON body.
    pub(crate) async fn call_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        Ok(self.call(request).await?.json().await?)
    }

    /// Send `request` and return the body text.
    pub(crate) async fn call_text(&self, request: HttpRequest) -> Result<String> {
        Ok(self.call(request).await?.text().await?)
    }

    /// Send `request` and discard the body.
    pub(crate) async fn call_empty(&self, request: HttpRequest) -> Result<()> {
        self.call(request).await?.release();
        Ok(())
    }

    /// Send `request`; a 404 answer maps to `None`.
    pub(crate) async fn call_optional<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<Option<T>> {
        let response = self.transport.send(request).await?;
        if response.status().as_u16() == NOT_FOUND {
            response.release();
            return Ok(None);
        }
        Ok(Some(response.error_for_status().await?.json().await?))
    }

    /// Send `request` as a streamed call and decode every line as JSON.
    pub(crate) async fn call_stream(&self, request: HttpRequest) -> Result<JsonStream> {
        let response = self.call(request.stream()).await?;
        Ok(lines_of(response))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("graph", &self.graph)
            .field("verified", &self.trust.is_some())
            .finish()
    }
}

/// The body of `response` as a stream of JSON lines.
pub(crate) fn lines_of(response: HttpResponse) -> JsonStream {
    Box::pin(response.lines().json::<Value>().map(|item| item.map_err(Into::into)))
}
