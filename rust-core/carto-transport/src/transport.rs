// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The async transport.
//!
//! One [`AsyncTransport`] owns one connection pool, one session id, the
//! authentication state and the background renewal task. Requests combine
//! the immutable base headers, the authentication header and per-request
//! overrides into a fresh header map; nothing shared is mutated per request.

use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use carto_trust::{tls, PskSigner, TrustStore};
use chrono::Utc;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, instrument, warn, Dispatch};
use url::Url;

use crate::auth::{renewal_delay, token_expiry, Auth};
use crate::config::{TransportConfig, MIN_TOKEN_RETRY_INTERVAL};
use crate::error::{Result, TransportError};
use crate::request::{Body, HttpRequest};
use crate::response::HttpResponse;
use crate::websocket::{self, DuplexSession, Outgoing, SessionShared};

/// Bearer renewal endpoint.
pub const RENEW_PATH: &str = "/authorization/renew";

/// Length of the session identifier.
pub const SESSION_ID_LEN: usize = 10;

const SESSION_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A fresh session identifier: upper-case letters and digits.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| SESSION_ALPHABET[rng.gen_range(0..SESSION_ALPHABET.len())] as char)
        .collect()
}

struct TransportInner {
    base_url: Url,
    session_id: String,
    base_headers: HeaderMap,
    auth: Auth,
    verify: bool,
    trust: Option<TrustStore>,
    request_timeout: Option<Duration>,
    renew_before: Duration,
    retry_interval: Duration,
    /// Pool keyed by the trust generation it was built for.
    http: Mutex<Option<(u64, reqwest::Client)>>,
    renewal: Mutex<Option<JoinHandle<()>>>,
    sessions: Mutex<Vec<Weak<SessionShared>>>,
    dispatch: Dispatch,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.renewal).take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HTTP and WebSocket access to the core.
///
/// Cloning is cheap; clones share the pool, session and token.
#[derive(Clone)]
pub struct AsyncTransport {
    inner: Arc<TransportInner>,
}

impl AsyncTransport {
    /// Build a transport. `trust` supplies the CA when `config.verify` is set;
    /// without it the public web roots are used.
    pub fn new(config: &TransportConfig, trust: Option<TrustStore>) -> Result<Self> {
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        Self::with_dispatch(config, trust, dispatch)
    }

    /// Build a transport whose requests and background tasks log to `dispatch`.
    pub fn with_dispatch(
        config: &TransportConfig,
        trust: Option<TrustStore>,
        dispatch: Dispatch,
    ) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.base_url.clone()));
        }

        let mut base_headers = HeaderMap::new();
        base_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        base_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &config.additional_headers {
            let (name, value) = parse_header(name, value)?;
            base_headers.insert(name, value);
        }

        // The authorization header moves out of the static set into the auth state.
        let configured_bearer = base_headers.remove(AUTHORIZATION);
        let auth = match (&config.psk, configured_bearer) {
            (Some(psk), _) => Auth::Psk {
                signer: PskSigner::new(psk),
                ttl: config.psk_token_ttl,
            },
            (None, Some(mut bearer)) => {
                bearer.set_sensitive(true);
                Auth::Bearer(RwLock::new(bearer))
            }
            (None, None) => Auth::None,
        };

        Ok(Self {
            inner: Arc::new(TransportInner {
                base_url,
                session_id: generate_session_id(),
                base_headers,
                auth,
                verify: config.verify,
                trust,
                request_timeout: config.request_timeout,
                renew_before: config.renew_auth_token_before,
                retry_interval: config.token_retry_interval.max(MIN_TOKEN_RETRY_INTERVAL),
                http: Mutex::new(None),
                renewal: Mutex::new(None),
                sessions: Mutex::new(Vec::new()),
                dispatch,
            }),
        })
    }

    /// Session identifier attached to every request.
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// The core's base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The trust store used for TLS verification, if any.
    pub fn trust(&self) -> Option<&TrustStore> {
        self.inner.trust.as_ref()
    }

    /// The bearer header currently attached to requests, in bearer mode.
    pub fn current_bearer(&self) -> Option<HeaderValue> {
        self.inner.auth.bearer()
    }

    /// Arm the bearer renewal task. Idempotent; a no-op outside bearer mode.
    pub fn start(&self) {
        if !matches!(self.inner.auth, Auth::Bearer(_)) {
            return;
        }
        let mut slot = lock(&self.inner.renewal);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let task = renew_loop(Arc::downgrade(&self.inner)).with_subscriber(self.inner.dispatch.clone());
        *slot = Some(tokio::spawn(task));
        tracing::dispatcher::with_default(&self.inner.dispatch, || {
            debug!("auth token renewal armed");
        });
    }

    /// Stop the renewal task and close every open duplex session.
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.inner.renewal).take() {
            task.abort();
        }
        let sessions: Vec<_> = lock(&self.inner.sessions).drain(..).collect();
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.close();
        }
    }

    /// Whether the renewal task is running.
    pub fn is_renewing(&self) -> bool {
        lock(&self.inner.renewal)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Send `request` and return the response, whatever its status.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.logged(|| self.send_inner(request)).await
    }

    /// Send `request` and fail with [`TransportError::Status`] on a non-success status.
    pub async fn call(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request).await?.error_for_status().await
    }

    /// Open a WebSocket session on `path`.
    ///
    /// Incoming text frames are delivered by the returned session, which ends
    /// with [`Frame::Closed`](crate::Frame::Closed). Items sent on `outgoing`
    /// are written as newline-terminated text frames.
    pub async fn open_duplex(
        &self,
        path: &str,
        params: &[(String, String)],
        outgoing: Option<tokio::sync::mpsc::UnboundedReceiver<Outgoing>>,
    ) -> Result<DuplexSession> {
        self.logged(|| self.open_duplex_inner(path, params, outgoing))
            .await
    }

    /// Absolute URL for `path`, with the session id and `params` as query.
    pub fn url(&self, path: &str, params: &[(String, String)]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        let path = path.trim_start_matches('/');
        url.set_path(&format!("{prefix}/{path}"));
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("session_id", &self.inner.session_id);
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Headers for one request: base, then authentication, then the request's own.
    pub fn headers_for(&self, request: &HttpRequest) -> Result<HeaderMap> {
        let mut headers = self.inner.base_headers.clone();
        if let Some(value) = self.inner.auth.header_value()? {
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in &request.headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }
        if matches!(request.body, Body::Multipart(_)) {
            // reqwest sets the multipart boundary itself.
            headers.remove(CONTENT_TYPE);
        }
        Ok(headers)
    }

    /// Renew the bearer token once. The old token stays in place on failure.
    pub async fn renew_auth_token(&self) -> Result<()> {
        self.logged(|| renew_once(&self.inner)).await
    }

    #[instrument(level = "debug", skip_all, fields(method = %request.method, path = %request.path, session = %self.inner.session_id))]
    async fn send_inner(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = self.http_client().await?;
        let url = self.url(&request.path, &request.query)?;
        let headers = self.headers_for(&request)?;

        let mut builder = client.request(request.method.clone(), url).headers(headers);
        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.body(serde_json::to_vec(&value)?),
            Body::Text(text) => builder.body(text),
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Multipart(files) => builder.multipart(multipart_form(files).await?),
        };

        let response = builder.send().await?;
        debug!(status = response.status().as_u16(), "response received");
        Ok(HttpResponse::new(response))
    }

    async fn open_duplex_inner(
        &self,
        path: &str,
        params: &[(String, String)],
        outgoing: Option<tokio::sync::mpsc::UnboundedReceiver<Outgoing>>,
    ) -> Result<DuplexSession> {
        let mut url = self.url(path, params)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidUrl(format!("cannot use {scheme} for {url}")))?;

        let mut headers = self.headers_for(&HttpRequest::get(path))?;
        headers.remove(CONTENT_TYPE);
        let tls = if scheme == "wss" {
            Some(self.tls_config().await?)
        } else {
            None
        };

        let session = websocket::connect(url, headers, tls, outgoing, self.inner.dispatch.clone()).await?;
        let mut sessions = lock(&self.inner.sessions);
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.push(session.downgrade());
        Ok(session)
    }

    async fn logged<'a, F, T>(&'a self, make: impl FnOnce() -> F) -> T
    where
        F: Future<Output = T> + 'a,
    {
        let dispatch = self.inner.dispatch.clone();
        let future = tracing::dispatcher::with_default(&dispatch, make);
        future.with_subscriber(dispatch).await
    }

    /// Trust generation the pool must match, or 0 when not verifying against the store.
    async fn trust_generation(&self) -> Result<u64> {
        match (&self.inner.trust, self.inner.verify) {
            (Some(trust), true) => Ok(trust.ensure_loaded().await?.generation()),
            _ => Ok(0),
        }
    }

    async fn tls_config(&self) -> Result<Arc<rustls::ClientConfig>> {
        if !self.inner.verify {
            return Ok(tls::insecure_config()?);
        }
        match &self.inner.trust {
            Some(trust) => Ok(trust.verification_context().await?),
            None => Ok(tls::public_roots_config()?),
        }
    }

    async fn http_client(&self) -> Result<reqwest::Client> {
        let generation = self.trust_generation().await?;
        if let Some((cached, client)) = lock(&self.inner.http).as_ref() {
            if *cached == generation {
                return Ok(client.clone());
            }
        }

        let tls = self.tls_config().await?;
        let mut builder = reqwest::Client::builder().use_preconfigured_tls((*tls).clone());
        if let Some(timeout) = self.inner.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        debug!(generation, verify = self.inner.verify, "connection pool built");
        *lock(&self.inner.http) = Some((generation, client.clone()));
        Ok(client)
    }
}

impl std::fmt::Debug for AsyncTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTransport")
            .field("base_url", &self.inner.base_url.as_str())
            .field("session_id", &self.inner.session_id)
            .field("auth", &self.inner.auth.kind())
            .field("verify", &self.inner.verify)
            .finish()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_str(name)
        .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidHeader(format!("{name}: {e}")))?;
    Ok((name, value))
}

async fn multipart_form(files: Vec<(String, std::path::PathBuf)>) -> Result<Form> {
    let mut form = Form::new();
    for (name, path) in files {
        let data = tokio::fs::read(&path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        form = form.part(name, Part::bytes(data).file_name(file_name));
    }
    Ok(form)
}

async fn renew_once(inner: &Arc<TransportInner>) -> Result<()> {
    let transport = AsyncTransport {
        inner: Arc::clone(inner),
    };
    let response = transport.call(HttpRequest::get(RENEW_PATH)).await?;
    let renewed = response
        .headers()
        .get(AUTHORIZATION)
        .cloned()
        .ok_or_else(|| TransportError::Token("renewal response carries no authorization header".into()))?;
    response.release();
    inner.auth.replace_bearer(renewed);
    Ok(())
}

/// Renew the bearer token `renew_before` ahead of its expiry, forever.
///
/// Holds only a weak reference between attempts so a dropped transport ends the loop.
async fn renew_loop(inner: Weak<TransportInner>) {
    loop {
        let (delay, retry_interval) = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let Some(expiry) = inner
                .auth
                .bearer()
                .and_then(|value| value.to_str().ok().and_then(token_expiry))
            else {
                debug!("bearer token carries no expiry, renewal disabled");
                return;
            };
            (
                renewal_delay(expiry, inner.renew_before, Utc::now()),
                inner.retry_interval,
            )
        };

        tokio::time::sleep(delay).await;

        let Some(strong) = inner.upgrade() else {
            return;
        };
        match renew_once(&strong).await {
            Ok(()) => {
                let expiry = strong
                    .auth
                    .bearer()
                    .and_then(|value| value.to_str().ok().and_then(token_expiry));
                info!(expires = ?expiry, "auth token renewed");
                let still_due = expiry
                    .is_some_and(|expiry| renewal_delay(expiry, strong.renew_before, Utc::now()).is_zero());
                drop(strong);
                if still_due {
                    // The core handed back a token that is already inside the margin.
                    tokio::time::sleep(retry_interval).await;
                }
            }
            Err(err) => {
                warn!(error = %err, retry_in = ?retry_interval, "auth token renewal failed, keeping current token");
                drop(strong);
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.bytes().all(|b| SESSION_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_retry_interval_has_a_floor() {
        let mut config = TransportConfig::new("http://core:8900");
        config.token_retry_interval = Duration::ZERO;
        let transport = AsyncTransport::new(&config, None).unwrap();
        assert_eq!(transport.inner.retry_interval, MIN_TOKEN_RETRY_INTERVAL);

        config.token_retry_interval = Duration::from_secs(45);
        let transport = AsyncTransport::new(&config, None).unwrap();
        assert_eq!(transport.inner.retry_interval, Duration::from_secs(45));
    }

    #[test]
    fn test_url_keeps_base_prefix_and_adds_session() {
        let transport = AsyncTransport::new(&TransportConfig::new("http://core:8900/api/"), None).unwrap();
        let url = transport
            .url("/graph/g/search", &[("section".into(), "reported".into())])
            .unwrap();
        assert_eq!(url.path(), "/api/graph/g/search");
        let query: Vec<_> = url.query_pairs().into_owned().collect();
        assert_eq!(query[0], ("session_id".to_string(), transport.session_id().to_string()));
        assert_eq!(query[1], ("section".to_string(), "reported".to_string()));
    }

    #[test]
    fn test_headers_merge_without_mutating_base() {
        let mut config = TransportConfig::new("http://core:8900");
        config.additional_headers.insert("X-Team".into(), "inventory".into());
        let transport = AsyncTransport::new(&config, None).unwrap();

        let streamed = transport.headers_for(&HttpRequest::get("/x").stream()).unwrap();
        assert_eq!(streamed[ACCEPT], "application/x-ndjson");
        assert_eq!(streamed["x-team"], "inventory");

        let plain = transport.headers_for(&HttpRequest::get("/x")).unwrap();
        assert_eq!(plain[ACCEPT], "application/json");
    }

    #[test]
    fn test_configured_authorization_enables_bearer_mode() {
        let mut config = TransportConfig::new("http://core:8900");
        config.additional_headers.insert("Authorization".into(), "Bearer abc".into());
        let transport = AsyncTransport::new(&config, None).unwrap();
        assert_eq!(transport.current_bearer().unwrap(), "Bearer abc");

        config.psk = Some("secret".into());
        let transport = AsyncTransport::new(&config, None).unwrap();
        assert!(transport.current_bearer().is_none());
    }

    #[test]
    fn test_multipart_drops_content_type() {
        let transport = AsyncTransport::new(&TransportConfig::new("http://core:8900"), None).unwrap();
        let request = HttpRequest::post("/cli/execute").multipart(vec![("f".to_string(), "a.txt".into())]);
        let headers = transport.headers_for(&request).unwrap();
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_invalid_header_is_reported() {
        let mut config = TransportConfig::new("http://core:8900");
        config.additional_headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            AsyncTransport::new(&config, None),
            Err(TransportError::InvalidHeader(_))
        ));
    }
}
