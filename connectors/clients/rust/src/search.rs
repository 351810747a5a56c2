// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Search operations on the client's graph.
//!
//! Searches are sent as plain-text bodies in the core's search syntax. The
//! list, graph and aggregate forms stream their results line by line.

use carto_transport::HttpRequest;

use crate::client::{Client, JsonStream};
use crate::error::Result;
use crate::types::{EstimatedSearchCost, JsonObject};

/// Section searches are evaluated against unless told otherwise.
pub const DEFAULT_SECTION: &str = "reported";

impl Client {
    /// Run `search` and return the query the core would execute.
    pub async fn search_graph_raw(&self, search: &str) -> Result<JsonObject> {
        self.call_json(HttpRequest::post(self.graph_path("/search/raw")).text(search))
            .await
    }

    /// Estimate the cost of `search` without running it.
    pub async fn search_graph_explain(&self, search: &str) -> Result<EstimatedSearchCost> {
        self.call_json(HttpRequest::post(self.graph_path("/search/explain")).text(search))
            .await
    }

    /// Stream the nodes matching `search`.
    ///
    /// # Arguments
    ///
    /// * `search`  - Search in the core's syntax, e.g. `is(instance) and age > 3d`.
    /// * `section` - Section the search is relative to; [`DEFAULT_SECTION`] when `None`.
    pub async fn search_list(&self, search: &str, section: Option<&str>) -> Result<JsonStream> {
        self.search_stream("/search/list", search, section).await
    }

    /// Stream the nodes and edges of the subgraph matching `search`.
    pub async fn search_graph(&self, search: &str, section: Option<&str>) -> Result<JsonStream> {
        self.search_stream("/search/graph", search, section).await
    }

    /// Stream the groups of an aggregation search.
    pub async fn search_aggregate(&self, search: &str, section: Option<&str>) -> Result<JsonStream> {
        self.search_stream("/search/aggregate", search, section).await
    }

    async fn search_stream(&self, kind: &str, search: &str, section: Option<&str>) -> Result<JsonStream> {
        let request = HttpRequest::post(self.graph_path(kind))
            .query("section", section.unwrap_or(DEFAULT_SECTION))
            .text(search);
        self.call_stream(request).await
    }
}
