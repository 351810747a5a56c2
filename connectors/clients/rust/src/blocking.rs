// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Blocking client.
//!
//! [`BlockingClient`] runs every [`Client`] call on a dedicated carrier
//! thread and blocks the caller until it completes. The carrier, the trust
//! store and the transport start lazily on the first call; dropping the last
//! handle shuts them down.
//!
//! Do not use a `BlockingClient` from inside an async task: the call blocks
//! the task's worker thread.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use carto_carrier::{Carrier, CarrierError};
use carto_transport::{ContentKind, HttpResponse, Outgoing};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, Dispatch};

use crate::cli::CliOptions;
use crate::client::{Client, JsonStream};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::{
    CliEvaluation, ConfigValidation, EstimatedSearchCost, GraphUpdate, JsonObject, Kind, Model, Subscriber,
    Subscription,
};

/// Name of the carrier thread.
pub const CARRIER_THREAD_NAME: &str = "carto-client";

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// Owns the carrier and the one-time start of the async client.
struct Bridge {
    carrier: Carrier,
    client: Client,
    armed: AtomicBool,
    init: Mutex<()>,
    torn_down: AtomicBool,
    dispatch: Dispatch,
}

impl Bridge {
    fn ensure_started(&self) -> Result<()> {
        if self.armed.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if self.armed.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.torn_down.load(Ordering::Acquire) {
            return Err(CarrierError::AlreadyStopped.into());
        }
        self.carrier.start()?;
        let client = self.client.clone();
        self.carrier.try_submit_and_wait(async move { client.start().await })?;
        self.armed.store(true, Ordering::Release);
        tracing::dispatcher::with_default(&self.dispatch, || {
            debug!(session = %self.client.session_id(), "blocking client started");
        });
        Ok(())
    }

    fn shutdown(&self) {
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.armed.swap(false, Ordering::AcqRel) {
            let client = self.client.clone();
            if let Err(err) = self.carrier.submit_and_wait(async move { client.shutdown().await }) {
                tracing::dispatcher::with_default(&self.dispatch, || {
                    debug!(error = %err, "client shutdown skipped");
                });
            }
        }
        self.carrier.stop();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// BlockingClient
// ---------------------------------------------------------------------------

/// Blocking counterpart of [`Client`], with the same methods.
///
/// Cloning is cheap; clones share the carrier thread and the connection.
///
/// # Examples
///
/// ```rust,no_run
/// use carto_client::{BlockingClient, ClientConfig};
///
/// # fn main() -> carto_client::Result<()> {
/// let client = BlockingClient::new(ClientConfig::new("https://localhost:8900").with_psk("changeme"))?;
/// for node in client.search_list("is(account)", Some("reported"))? {
///     println!("{}", node?);
/// }
/// client.shutdown();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlockingClient {
    client: Client,
    bridge: Arc<Bridge>,
}

impl BlockingClient {
    /// Build a blocking client. Nothing starts until the first call.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        Self::with_dispatch(config, dispatch)
    }

    /// Build a blocking client whose carrier and components log to `dispatch`.
    pub fn with_dispatch(config: ClientConfig, dispatch: Dispatch) -> Result<Self> {
        let client = Client::with_dispatch(config, dispatch.clone())?;
        Ok(Self {
            client: client.clone(),
            bridge: Arc::new(Bridge {
                carrier: Carrier::with_dispatch(CARRIER_THREAD_NAME, dispatch.clone()),
                client,
                armed: AtomicBool::new(false),
                init: Mutex::new(()),
                torn_down: AtomicBool::new(false),
                dispatch,
            }),
        })
    }

    /// A handle sharing this one's carrier and connection but addressing `graph`.
    pub fn on_graph(&self, graph: &str) -> Self {
        Self {
            client: self.client.on_graph(graph),
            bridge: Arc::clone(&self.bridge),
        }
    }

    /// Start the carrier, load the CA certificate and arm the background
    /// tasks now instead of on the first call.
    pub fn start(&self) -> Result<()> {
        self.bridge.ensure_started()
    }

    /// Stop the background tasks and the carrier thread. Idempotent; later
    /// calls fail with [`CarrierError::AlreadyStopped`].
    pub fn shutdown(&self) {
        self.bridge.shutdown();
    }

    /// Whether the carrier is running.
    pub fn is_running(&self) -> bool {
        self.bridge.carrier.is_running()
    }

    /// The async client every call is delegated to.
    pub fn async_client(&self) -> &Client {
        &self.client
    }

    /// The graph calls address.
    pub fn graph(&self) -> &str {
        self.client.graph()
    }

    /// Session id sent with every request.
    pub fn session_id(&self) -> &str {
        self.client.session_id()
    }

    /// Run `call` against the async client on the carrier thread.
    pub fn run<F, Fut, T>(&self, call: F) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.bridge.ensure_started()?;
        self.bridge.carrier.try_submit_and_wait(call(self.client.clone()))
    }

    fn run_stream<F, Fut>(&self, call: F) -> Result<BlockingStream>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<JsonStream>> + Send + 'static,
    {
        let stream = self.run(call)?;
        Ok(BlockingStream {
            stream: Some(stream),
            bridge: Arc::clone(&self.bridge),
        })
    }

    // -- Model --------------------------------------------------------------

    /// See [`Client::model`].
    pub fn model(&self) -> Result<Model> {
        self.run(|c| async move { c.model().await })
    }

    /// See [`Client::update_model`].
    pub fn update_model(&self, kinds: &[Kind]) -> Result<Model> {
        let kinds = kinds.to_vec();
        self.run(|c| async move { c.update_model(&kinds).await })
    }

    // -- Graph --------------------------------------------------------------

    /// See [`Client::list_graphs`].
    pub fn list_graphs(&self) -> Result<BTreeSet<String>> {
        self.run(|c| async move { c.list_graphs().await })
    }

    /// See [`Client::get_graph`].
    pub fn get_graph(&self, name: &str) -> Result<Option<JsonObject>> {
        let name = name.to_string();
        self.run(|c| async move { c.get_graph(&name).await })
    }

    /// See [`Client::create_graph`].
    pub fn create_graph(&self, name: &str) -> Result<JsonObject> {
        let name = name.to_string();
        self.run(|c| async move { c.create_graph(&name).await })
    }

    /// See [`Client::delete_graph`].
    pub fn delete_graph(&self, name: &str, truncate: bool) -> Result<String> {
        let name = name.to_string();
        self.run(|c| async move { c.delete_graph(&name, truncate).await })
    }

    /// See [`Client::create_node`].
    pub fn create_node(&self, parent_node_id: &str, node_id: &str, node: &JsonObject) -> Result<JsonObject> {
        let (parent_node_id, node_id, node) = (parent_node_id.to_string(), node_id.to_string(), node.clone());
        self.run(|c| async move { c.create_node(&parent_node_id, &node_id, &node).await })
    }

    /// See [`Client::patch_node`].
    pub fn patch_node(&self, node_id: &str, node: &JsonObject, section: Option<&str>) -> Result<JsonObject> {
        let (node_id, node) = (node_id.to_string(), node.clone());
        let section = section.map(str::to_string);
        self.run(|c| async move { c.patch_node(&node_id, &node, section.as_deref()).await })
    }

    /// See [`Client::get_node`].
    pub fn get_node(&self, node_id: &str) -> Result<JsonObject> {
        let node_id = node_id.to_string();
        self.run(|c| async move { c.get_node(&node_id).await })
    }

    /// See [`Client::delete_node`].
    pub fn delete_node(&self, node_id: &str) -> Result<()> {
        let node_id = node_id.to_string();
        self.run(|c| async move { c.delete_node(&node_id).await })
    }

    /// See [`Client::patch_nodes`].
    pub fn patch_nodes(&self, nodes: &[JsonObject]) -> Result<Vec<JsonObject>> {
        let nodes = nodes.to_vec();
        self.run(|c| async move { c.patch_nodes(&nodes).await })
    }

    /// See [`Client::merge_graph`].
    pub fn merge_graph(&self, update: &[Value]) -> Result<GraphUpdate> {
        let update = update.to_vec();
        self.run(|c| async move { c.merge_graph(&update).await })
    }

    /// See [`Client::add_to_batch`].
    pub fn add_to_batch(&self, update: &[Value], batch_id: Option<&str>) -> Result<(String, GraphUpdate)> {
        let update = update.to_vec();
        let batch_id = batch_id.map(str::to_string);
        self.run(|c| async move { c.add_to_batch(&update, batch_id.as_deref()).await })
    }

    /// See [`Client::list_batches`].
    pub fn list_batches(&self) -> Result<Vec<JsonObject>> {
        self.run(|c| async move { c.list_batches().await })
    }

    /// See [`Client::commit_batch`].
    pub fn commit_batch(&self, batch_id: &str) -> Result<()> {
        let batch_id = batch_id.to_string();
        self.run(|c| async move { c.commit_batch(&batch_id).await })
    }

    /// See [`Client::abort_batch`].
    pub fn abort_batch(&self, batch_id: &str) -> Result<()> {
        let batch_id = batch_id.to_string();
        self.run(|c| async move { c.abort_batch(&batch_id).await })
    }

    // -- Search -------------------------------------------------------------

    /// See [`Client::search_graph_raw`].
    pub fn search_graph_raw(&self, search: &str) -> Result<JsonObject> {
        let search = search.to_string();
        self.run(|c| async move { c.search_graph_raw(&search).await })
    }

    /// See [`Client::search_graph_explain`].
    pub fn search_graph_explain(&self, search: &str) -> Result<EstimatedSearchCost> {
        let search = search.to_string();
        self.run(|c| async move { c.search_graph_explain(&search).await })
    }

    /// See [`Client::search_list`].
    pub fn search_list(&self, search: &str, section: Option<&str>) -> Result<BlockingStream> {
        let (search, section) = (search.to_string(), section.map(str::to_string));
        self.run_stream(|c| async move { c.search_list(&search, section.as_deref()).await })
    }

    /// See [`Client::search_graph`].
    pub fn search_graph(&self, search: &str, section: Option<&str>) -> Result<BlockingStream> {
        let (search, section) = (search.to_string(), section.map(str::to_string));
        self.run_stream(|c| async move { c.search_graph(&search, section.as_deref()).await })
    }

    /// See [`Client::search_aggregate`].
    pub fn search_aggregate(&self, search: &str, section: Option<&str>) -> Result<BlockingStream> {
        let (search, section) = (search.to_string(), section.map(str::to_string));
        self.run_stream(|c| async move { c.search_aggregate(&search, section.as_deref()).await })
    }

    // -- Subscribers --------------------------------------------------------

    /// See [`Client::subscribers`].
    pub fn subscribers(&self) -> Result<Vec<Subscriber>> {
        self.run(|c| async move { c.subscribers().await })
    }

    /// See [`Client::subscribers_for_event`].
    pub fn subscribers_for_event(&self, event_type: &str) -> Result<Vec<Subscriber>> {
        let event_type = event_type.to_string();
        self.run(|c| async move { c.subscribers_for_event(&event_type).await })
    }

    /// See [`Client::subscriber`].
    pub fn subscriber(&self, uid: &str) -> Result<Option<Subscriber>> {
        let uid = uid.to_string();
        self.run(|c| async move { c.subscriber(&uid).await })
    }

    /// See [`Client::update_subscriber`].
    pub fn update_subscriber(&self, uid: &str, subscriptions: &[Subscription]) -> Result<Subscriber> {
        let (uid, subscriptions) = (uid.to_string(), subscriptions.to_vec());
        self.run(|c| async move { c.update_subscriber(&uid, &subscriptions).await })
    }

    /// See [`Client::add_subscription`].
    pub fn add_subscription(&self, uid: &str, subscription: &Subscription) -> Result<Subscriber> {
        let (uid, subscription) = (uid.to_string(), subscription.clone());
        self.run(|c| async move { c.add_subscription(&uid, &subscription).await })
    }

    /// See [`Client::delete_subscription`].
    pub fn delete_subscription(&self, uid: &str, subscription: &Subscription) -> Result<Subscriber> {
        let (uid, subscription) = (uid.to_string(), subscription.clone());
        self.run(|c| async move { c.delete_subscription(&uid, &subscription).await })
    }

    /// See [`Client::delete_subscriber`].
    pub fn delete_subscriber(&self, uid: &str) -> Result<()> {
        let uid = uid.to_string();
        self.run(|c| async move { c.delete_subscriber(&uid).await })
    }

    // -- CLI ----------------------------------------------------------------

    /// See [`Client::cli_evaluate`].
    pub fn cli_evaluate(
        &self,
        command: &str,
        graph: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> Result<Vec<CliEvaluation>> {
        let (command, graph, env) = (command.to_string(), graph.map(str::to_string), env.clone());
        self.run(|c| async move { c.cli_evaluate(&command, graph.as_deref(), &env).await })
    }

    /// Execute `command` and return the raw response.
    pub fn cli_execute_raw(&self, command: &str, options: &CliOptions) -> Result<BlockingResponse> {
        let (command, options) = (command.to_string(), options.clone());
        let response = self.run(|c| async move { c.cli_execute_raw(&command, &options).await })?;
        Ok(BlockingResponse {
            response,
            bridge: Arc::clone(&self.bridge),
        })
    }

    /// See [`Client::cli_execute`].
    pub fn cli_execute(&self, command: &str, options: &CliOptions) -> Result<BlockingStream> {
        let (command, options) = (command.to_string(), options.clone());
        self.run_stream(|c| async move { c.cli_execute(&command, &options).await })
    }

    /// See [`Client::cli_info`].
    pub fn cli_info(&self) -> Result<JsonObject> {
        self.run(|c| async move { c.cli_info().await })
    }

    // -- Configs ------------------------------------------------------------

    /// See [`Client::configs`].
    pub fn configs(&self) -> Result<BlockingStream> {
        self.run_stream(|c| async move { c.configs().await })
    }

    /// See [`Client::config`].
    pub fn config(&self, config_id: &str) -> Result<JsonObject> {
        let config_id = config_id.to_string();
        self.run(|c| async move { c.config(&config_id).await })
    }

    /// See [`Client::put_config`].
    pub fn put_config(&self, config_id: &str, config: &JsonObject, validate: bool) -> Result<JsonObject> {
        let (config_id, config) = (config_id.to_string(), config.clone());
        self.run(|c| async move { c.put_config(&config_id, &config, validate).await })
    }

    /// See [`Client::patch_config`].
    pub fn patch_config(&self, config_id: &str, patch: &JsonObject) -> Result<JsonObject> {
        let (config_id, patch) = (config_id.to_string(), patch.clone());
        self.run(|c| async move { c.patch_config(&config_id, &patch).await })
    }

    /// See [`Client::delete_config`].
    pub fn delete_config(&self, config_id: &str) -> Result<()> {
        let config_id = config_id.to_string();
        self.run(|c| async move { c.delete_config(&config_id).await })
    }

    /// See [`Client::get_configs_model`].
    pub fn get_configs_model(&self) -> Result<Model> {
        self.run(|c| async move { c.get_configs_model().await })
    }

    /// See [`Client::update_configs_model`].
    pub fn update_configs_model(&self, kinds: &[Kind]) -> Result<Model> {
        let kinds = kinds.to_vec();
        self.run(|c| async move { c.update_configs_model(&kinds).await })
    }

    /// See [`Client::list_configs_validation`].
    pub fn list_configs_validation(&self) -> Result<BlockingStream> {
        self.run_stream(|c| async move { c.list_configs_validation().await })
    }

    /// See [`Client::get_config_validation`].
    pub fn get_config_validation(&self, config_id: &str) -> Result<Option<ConfigValidation>> {
        let config_id = config_id.to_string();
        self.run(|c| async move { c.get_config_validation(&config_id).await })
    }

    /// See [`Client::put_config_validation`].
    pub fn put_config_validation(&self, validation: &ConfigValidation) -> Result<ConfigValidation> {
        let validation = validation.clone();
        self.run(|c| async move { c.put_config_validation(&validation).await })
    }

    // -- System and events --------------------------------------------------

    /// See [`Client::ping`].
    pub fn ping(&self) -> Result<String> {
        self.run(|c| async move { c.ping().await })
    }

    /// See [`Client::ready`].
    pub fn ready(&self) -> Result<String> {
        self.run(|c| async move { c.ready().await })
    }

    /// Listen to core events; the iterator ends when the session closes.
    pub fn events(&self, event_types: &[&str], outgoing: Option<UnboundedReceiver<Outgoing>>) -> Result<BlockingStream> {
        let event_types: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();
        self.run_stream(|c| async move {
            let event_types: Vec<&str> = event_types.iter().map(String::as_str).collect();
            c.events(&event_types, outgoing).await
        })
    }
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .field("running", &self.is_running())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BlockingResponse
// ---------------------------------------------------------------------------

/// A raw response whose body is read on the carrier thread.
///
/// Consume the body with one accessor or [`release`](Self::release) it;
/// dropping it releases it too.
pub struct BlockingResponse {
    response: HttpResponse,
    bridge: Arc<Bridge>,
}

impl BlockingResponse {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    /// Value of header `name`, if present and ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// The `Content-Type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.response.content_type()
    }

    /// How the body is framed, from its content type.
    pub fn content_kind(&self) -> Result<ContentKind> {
        Ok(self.response.content_kind()?)
    }

    /// The body as text.
    pub fn text(self) -> Result<String> {
        let response = self.response;
        self.bridge
            .carrier
            .try_submit_and_wait(async move { Ok(response.text().await?) })
    }

    /// The body parsed as JSON.
    pub fn json<T: DeserializeOwned + Send + 'static>(self) -> Result<T> {
        let response = self.response;
        self.bridge
            .carrier
            .try_submit_and_wait(async move { Ok(response.json().await?) })
    }

    /// The whole body.
    pub fn bytes(self) -> Result<Vec<u8>> {
        let response = self.response;
        self.bridge
            .carrier
            .try_submit_and_wait(async move { Ok(response.bytes().await?) })
    }

    /// The body as non-blank lines.
    pub fn lines(self) -> BlockingStream<Vec<u8>> {
        let lines = self.response.lines().map(|line| line.map_err(Into::into)).boxed();
        BlockingStream {
            stream: Some(lines),
            bridge: self.bridge,
        }
    }

    /// Discard the body.
    pub fn release(self) {
        self.response.release();
    }
}

impl std::fmt::Debug for BlockingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingResponse")
            .field("status", &self.status())
            .field("content_type", &self.content_type())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BlockingStream
// ---------------------------------------------------------------------------

/// A forward-only iterator over a streamed answer.
///
/// Each step fetches the next item on the carrier thread. Once exhausted, or
/// after the carrier stops, it yields nothing more.
pub struct BlockingStream<T = Value> {
    stream: Option<BoxStream<'static, Result<T>>>,
    bridge: Arc<Bridge>,
}

impl<T: Send + 'static> Iterator for BlockingStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut stream = self.stream.take()?;
        let step = self.bridge.carrier.submit_and_wait(async move {
            let item = stream.next().await;
            (item, stream)
        });
        match step {
            Ok((Some(item), stream)) => {
                self.stream = Some(stream);
                Some(item)
            }
            Ok((None, _)) => None,
            Err(err) => Some(Err(err.into())),
        }
    }
}

impl<T> std::fmt::Debug for BlockingStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingStream")
            .field("exhausted", &self.stream.is_none())
            .finish()
    }
}
