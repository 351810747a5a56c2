// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Graph and node management, merges and merge batches.
//!
//! Node-level calls address the client's graph (see [`Client::on_graph`]);
//! graph-level calls name the graph explicitly.

use std::collections::BTreeSet;

use carto_transport::HttpRequest;
use serde_json::Value;

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::types::{GraphUpdate, JsonObject};

/// Response header carrying the id of a merge batch.
pub const BATCH_ID_HEADER: &str = "BatchId";

impl Client {
    // -- Graphs -------------------------------------------------------------

    /// Names of all graphs.
    pub async fn list_graphs(&self) -> Result<BTreeSet<String>> {
        self.call_json(HttpRequest::get("/graph")).await
    }

    /// The root node of graph `name`, or `None` if the graph does not exist.
    pub async fn get_graph(&self, name: &str) -> Result<Option<JsonObject>> {
        self.call_optional(HttpRequest::get(format!("/graph/{name}"))).await
    }

    /// Create graph `name` and return its root node.
    pub async fn create_graph(&self, name: &str) -> Result<JsonObject> {
        self.call_json(HttpRequest::post(format!("/graph/{name}"))).await
    }

    /// Delete graph `name`. With `truncate`, only its content is removed.
    pub async fn delete_graph(&self, name: &str, truncate: bool) -> Result<String> {
        let request = HttpRequest::delete(format!("/graph/{name}"))
            .query_opt("truncate", truncate.then_some("true"));
        self.call_text(request).await
    }

    // -- Nodes --------------------------------------------------------------

    /// Create `node` with id `node_id` below `parent_node_id`.
    pub async fn create_node(&self, parent_node_id: &str, node_id: &str, node: &JsonObject) -> Result<JsonObject> {
        let path = self.graph_path(&format!("/node/{node_id}/under/{parent_node_id}"));
        self.call_json(HttpRequest::post(path).json(node)?).await
    }

    /// Patch node `node_id`, optionally only within `section`.
    pub async fn patch_node(&self, node_id: &str, node: &JsonObject, section: Option<&str>) -> Result<JsonObject> {
        let section_path = section.map(|s| format!("/section/{s}")).unwrap_or_default();
        let path = self.graph_path(&format!("/node/{node_id}{section_path}"));
        self.call_json(HttpRequest::patch(path).json(node)?).await
    }

    /// Node `node_id` of the graph.
    pub async fn get_node(&self, node_id: &str) -> Result<JsonObject> {
        self.call_json(HttpRequest::get(self.graph_path(&format!("/node/{node_id}"))))
            .await
    }

    /// Delete node `node_id` from the graph.
    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        self.call_empty(HttpRequest::delete(self.graph_path(&format!("/node/{node_id}"))))
            .await
    }

    /// Patch several nodes at once; each must carry its id.
    pub async fn patch_nodes(&self, nodes: &[JsonObject]) -> Result<Vec<JsonObject>> {
        self.call_json(HttpRequest::patch(self.graph_path("/nodes")).json(nodes)?)
            .await
    }

    // -- Merges -------------------------------------------------------------

    /// Merge `update` (nodes and edges) into the graph.
    pub async fn merge_graph(&self, update: &[Value]) -> Result<GraphUpdate> {
        self.call_json(HttpRequest::post(self.graph_path("/merge")).json(update)?)
            .await
    }

    /// Merge `update` into a pending batch, creating one unless `batch_id` is given.
    ///
    /// Returns the batch id and the merge counters.
    pub async fn add_to_batch(&self, update: &[Value], batch_id: Option<&str>) -> Result<(String, GraphUpdate)> {
        let request = HttpRequest::post(self.graph_path("/batch/merge"))
            .query_opt("batch_id", batch_id)
            .json(update)?;
        let response = self.call(request).await?;
        let batch_id = response
            .headers()
            .get(BATCH_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{BATCH_ID_HEADER} header missing")))?;
        Ok((batch_id, response.json().await?))
    }

    /// Pending batches of the graph.
    pub async fn list_batches(&self) -> Result<Vec<JsonObject>> {
        self.call_json(HttpRequest::get(self.graph_path("/batch"))).await
    }

    /// Apply pending batch `batch_id`.
    pub async fn commit_batch(&self, batch_id: &str) -> Result<()> {
        self.call_empty(HttpRequest::post(self.graph_path(&format!("/batch/{batch_id}"))))
            .await
    }

    /// Discard pending batch `batch_id`.
    pub async fn abort_batch(&self, batch_id: &str) -> Result<()> {
        self.call_empty(HttpRequest::delete(self.graph_path(&format!("/batch/{batch_id}"))))
            .await
    }
}
