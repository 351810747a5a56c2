// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Data types exchanged with the core.
//!
//! Nodes, search results and configuration documents stay untyped
//! [`serde_json::Value`]s; the types here cover the fixed-shape answers
//! (model, merge statistics, search cost, subscribers, parsed commands).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};

/// A JSON object as sent and received by the core.
pub type JsonObject = Map<String, Value>;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// One kind in the core's data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kind {
    /// Fully qualified name.
    pub fqn: String,
    /// Runtime representation for simple kinds (`string`, `int32`, ...).
    #[serde(default)]
    pub runtime_kind: Option<String>,
    /// Properties, bases and everything else the core sends along.
    #[serde(flatten)]
    pub details: JsonObject,
}

impl Kind {
    /// A kind with only its name set.
    pub fn new(fqn: impl Into<String>) -> Self {
        Self {
            fqn: fqn.into(),
            runtime_kind: None,
            details: JsonObject::new(),
        }
    }
}

/// The core's data model, keyed by kind name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Kinds by fully qualified name.
    pub kinds: BTreeMap<String, Kind>,
}

impl Model {
    /// Map a model answer: either a list of kinds, a `{"kinds": {..}}`
    /// object, or an object keyed by kind name.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let mut kinds = BTreeMap::new();
                for item in items {
                    let kind: Kind = serde_json::from_value(item)?;
                    kinds.insert(kind.fqn.clone(), kind);
                }
                Ok(Self { kinds })
            }
            Value::Object(mut object) => match object.remove("kinds") {
                Some(kinds @ Value::Object(_)) => Ok(Self {
                    kinds: serde_json::from_value(kinds)?,
                }),
                Some(kinds @ Value::Array(_)) => Self::from_value(kinds),
                Some(other) => Err(ClientError::UnexpectedResponse(format!(
                    "model kinds must be an object or a list, got {other}"
                ))),
                None => Ok(Self {
                    kinds: serde_json::from_value(Value::Object(object))?,
                }),
            },
            other => Err(ClientError::UnexpectedResponse(format!(
                "can not map to model: {other}"
            ))),
        }
    }

    /// Look up a kind by name.
    pub fn kind(&self, fqn: &str) -> Option<&Kind> {
        self.kinds.get(fqn)
    }
}

// ---------------------------------------------------------------------------
// Graph updates and search cost
// ---------------------------------------------------------------------------

/// Counters returned by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphUpdate {
    /// Nodes added.
    pub nodes_created: u64,
    /// Nodes changed; `nodes_updates` on the wire.
    #[serde(rename = "nodes_updates")]
    pub nodes_updated: u64,
    /// Nodes removed.
    pub nodes_deleted: u64,
    /// Edges added.
    pub edges_created: u64,
    /// Edges changed.
    pub edges_updated: u64,
    /// Edges removed.
    pub edges_deleted: u64,
}

impl GraphUpdate {
    /// Total number of changed nodes and edges.
    pub fn total(&self) -> u64 {
        self.nodes_created
            + self.nodes_updated
            + self.nodes_deleted
            + self.edges_created
            + self.edges_updated
            + self.edges_deleted
    }
}

/// The core's verdict on how expensive a search is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatedQueryCostRating {
    /// Cheap to run.
    Simple,
    /// Noticeable load on the core.
    Complex,
    /// Should be rewritten.
    Bad,
}

/// Estimated cost of a search, as returned by the explain endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedSearchCost {
    /// Absolute cost; see `rating` for the interpretation.
    pub estimated_cost: u64,
    /// Estimated result size, from statistics rather than a count.
    pub estimated_nr_items: u64,
    /// Nodes available in the graph.
    pub available_nr_items: u64,
    /// The search cannot use an index.
    pub full_collection_scan: bool,
    /// Coarse verdict on the cost.
    pub rating: EstimatedQueryCostRating,
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Interest of a subscriber in one message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Message type subscribed to.
    pub message_type: String,
    /// The core waits for the subscriber to acknowledge the message.
    #[serde(default = "default_wait_for_completion")]
    pub wait_for_completion: bool,
    /// How long the core waits for the subscriber, in whole seconds on the wire.
    #[serde(default = "default_subscription_timeout", with = "seconds")]
    pub timeout: Duration,
}

impl Subscription {
    /// Subscribe to `message_type`, waiting for completion for up to a minute.
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            wait_for_completion: default_wait_for_completion(),
            timeout: default_subscription_timeout(),
        }
    }
}

fn default_wait_for_completion() -> bool {
    true
}

fn default_subscription_timeout() -> Duration {
    Duration::from_secs(60)
}

/// A registered subscriber and its subscriptions, keyed by message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Subscriber id.
    pub id: String,
    /// Subscriptions by message type.
    #[serde(default)]
    pub subscriptions: BTreeMap<String, Subscription>,
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!("invalid timeout {secs}")));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// One command of a parsed command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Command name.
    pub cmd: String,
    /// Argument string, if any.
    #[serde(default)]
    pub args: Option<String>,
}

/// A parsed command line and the environment it runs in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommands {
    /// Commands in pipeline order.
    pub commands: Vec<ParsedCommand>,
    /// Environment the commands see.
    #[serde(default)]
    pub env: JsonObject,
}

/// The core's evaluation of one command line: how it was parsed and what
/// would run.
#[derive(Debug, Clone, PartialEq)]
pub struct CliEvaluation {
    /// How the line was parsed.
    pub parsed: ParsedCommands,
    /// What would run.
    pub execute: Vec<Value>,
}

#[derive(Deserialize)]
pub(crate) struct RawEvaluation {
    parsed: Vec<ParsedCommand>,
    #[serde(default)]
    env: JsonObject,
    #[serde(default)]
    execute: Vec<Value>,
}

impl From<RawEvaluation> for CliEvaluation {
    fn from(raw: RawEvaluation) -> Self {
        Self {
            parsed: ParsedCommands {
                commands: raw.parsed,
                env: raw.env,
            },
            execute: raw.execute,
        }
    }
}

// ---------------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------------

/// Validation settings of one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidation {
    /// Configuration id.
    pub id: String,
    /// Changes must be confirmed by an external validator.
    #[serde(default)]
    pub external_validation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_model_from_kind_list() {
        let model = Model::from_value(json!([
            {"fqn": "string", "runtime_kind": "string"},
            {"fqn": "account", "properties": [{"name": "id", "kind": "string"}]}
        ]))
        .unwrap();
        assert_eq!(model.kinds.len(), 2);
        assert_eq!(model.kind("string").unwrap().runtime_kind.as_deref(), Some("string"));
        assert!(model.kind("account").unwrap().details.contains_key("properties"));
    }

    #[test]
    fn test_model_from_object_forms() {
        let keyed = Model::from_value(json!({"account": {"fqn": "account"}})).unwrap();
        assert!(keyed.kind("account").is_some());

        let wrapped = Model::from_value(json!({"kinds": {"account": {"fqn": "account"}}})).unwrap();
        assert_eq!(keyed, wrapped);

        assert!(matches!(
            Model::from_value(json!("nope")),
            Err(ClientError::UnexpectedResponse(_))
        ));
    }

    fn kind_json(name: &str, runtime: Option<&String>) -> Value {
        match runtime {
            Some(runtime) => json!({"fqn": name, "runtime_kind": runtime}),
            None => json!({"fqn": name, "properties": []}),
        }
    }

    proptest! {
        #[test]
        fn test_model_forms_agree(
            kinds in prop::collection::btree_map(
                "[a-z][a-z_]{0,11}".prop_filter("reserved key", |name| name != "kinds"),
                prop::option::of("string|int64|boolean"),
                0..12,
            )
        ) {
            let list: Vec<Value> = kinds.iter().map(|(name, runtime)| kind_json(name, runtime.as_ref())).collect();
            let keyed: serde_json::Map<String, Value> = kinds
                .iter()
                .map(|(name, runtime)| (name.clone(), kind_json(name, runtime.as_ref())))
                .collect();

            let from_list = Model::from_value(Value::Array(list)).unwrap();
            let from_keyed = Model::from_value(Value::Object(keyed.clone())).unwrap();
            let from_wrapped = Model::from_value(json!({ "kinds": keyed })).unwrap();

            prop_assert_eq!(from_list.kinds.len(), kinds.len());
            prop_assert_eq!(&from_list, &from_keyed);
            prop_assert_eq!(&from_list, &from_wrapped);
            for (name, runtime) in &kinds {
                prop_assert_eq!(from_list.kind(name).and_then(|k| k.runtime_kind.as_ref()), runtime.as_ref());
            }
        }
    }

    #[test]
    fn test_graph_update_wire_names() {
        let update: GraphUpdate = serde_json::from_value(json!({
            "nodes_created": 2, "nodes_updates": 1, "nodes_deleted": 0,
            "edges_created": 2, "edges_updated": 0, "edges_deleted": 1
        }))
        .unwrap();
        assert_eq!(update.nodes_updated, 1);
        assert_eq!(update.total(), 6);
    }

    #[test]
    fn test_subscription_defaults_and_timeout_seconds() {
        let subscription: Subscription = serde_json::from_value(json!({"message_type": "collect"})).unwrap();
        assert!(subscription.wait_for_completion);
        assert_eq!(subscription.timeout, Duration::from_secs(60));

        let encoded = serde_json::to_value(Subscription {
            timeout: Duration::from_secs(90),
            ..Subscription::new("cleanup")
        })
        .unwrap();
        assert_eq!(encoded["timeout"], 90);
    }

    #[test]
    fn test_cli_evaluation_mapping() {
        let raw: RawEvaluation = serde_json::from_value(json!({
            "parsed": [{"cmd": "search", "args": "is(account)"}, {"cmd": "count"}],
            "env": {"graph": "cartograph"},
            "execute": []
        }))
        .unwrap();
        let evaluation = CliEvaluation::from(raw);
        assert_eq!(evaluation.parsed.commands.len(), 2);
        assert_eq!(evaluation.parsed.commands[1].args, None);
        assert_eq!(evaluation.parsed.env["graph"], "cartograph");
    }

    #[test]
    fn test_search_cost_rating() {
        let cost: EstimatedSearchCost = serde_json::from_value(json!({
            "estimated_cost": 12, "estimated_nr_items": 3, "available_nr_items": 40,
            "full_collection_scan": false, "rating": "simple"
        }))
        .unwrap();
        assert_eq!(cost.rating, EstimatedQueryCostRating::Simple);
    }
}
