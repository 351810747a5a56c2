// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Blocking client from plain threads, with the fixture core on its own runtime.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

use carto_carrier::CarrierError;
use carto_client::{BlockingClient, CliOptions, ClientConfig, ClientError, ContentKind, TransportError};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct Fixture {
    runtime: Runtime,
    server: MockServer,
}

impl Fixture {
    fn new() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { runtime, server }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn client(&self) -> BlockingClient {
        BlockingClient::new(ClientConfig::new(self.server.uri())).unwrap()
    }
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Answers `/graph/{g}/node/{id}` with `{"id": id}`.
struct EchoNode;

impl Respond for EchoNode {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request.url.path().rsplit('/').next().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({ "id": id }))
    }
}

#[test]
fn test_starts_on_first_call() {
    let fixture = Fixture::new();
    fixture.mount(Mock::given(path("/system/ping")).respond_with(ResponseTemplate::new(200).set_body_string("pong")));
    let client = fixture.client();

    assert!(!client.is_running());
    assert_eq!(client.ping().unwrap(), "pong");
    assert!(client.is_running());
}

#[test]
fn test_concurrent_callers_get_their_own_results() {
    let fixture = Fixture::new();
    fixture.mount(Mock::given(path_regex(r"^/graph/cartograph/node/[^/]+$")).respond_with(EchoNode));
    let client = fixture.client();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let client = client.clone();
            thread::spawn(move || {
                for call in 0..10 {
                    let id = format!("node-{worker}-{call}");
                    let node = client.get_node(&id).unwrap();
                    assert_eq!(node["id"], Value::String(id));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(fixture.runtime.block_on(fixture.server.received_requests()).unwrap().len(), 80);
}

#[test]
fn test_stream_is_single_pass() {
    let fixture = Fixture::new();
    fixture.mount(
        Mock::given(method("POST"))
            .and(path("/graph/cartograph/search/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/x-ndjson")
                    .set_body_string("{\"id\":\"a\"}\n{\"id\":\"b\"}\n"),
            ),
    );
    let client = fixture.client();

    let mut nodes = client.search_list("is(account)", None).unwrap();
    assert_eq!(nodes.next().unwrap().unwrap()["id"], "a");
    assert_eq!(nodes.next().unwrap().unwrap()["id"], "b");
    assert!(nodes.next().is_none());
    assert!(nodes.next().is_none());
}

#[test]
fn test_status_errors_propagate() {
    let fixture = Fixture::new();
    fixture.mount(Mock::given(path("/graph/cartograph/node/gone")).respond_with(ResponseTemplate::new(404).set_body_string("not found")));
    let client = fixture.client();

    match client.get_node("gone") {
        Err(ClientError::Transport(TransportError::Status { status, message })) => {
            assert_eq!(status, 404);
            assert_eq!(message, "not found");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_raw_cli_response_is_readable() {
    let fixture = Fixture::new();
    fixture.mount(
        Mock::given(path("/cli/execute")).respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/plain")
                .set_body_string("line one\nline two\n"),
        ),
    );
    let client = fixture.client();

    let response = client.cli_execute_raw("help", &CliOptions::default()).unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.content_kind().unwrap(), ContentKind::Text);
    let lines: Vec<_> = response.lines().map(|line| line.unwrap()).collect();
    assert_eq!(lines, vec![b"line one".to_vec(), b"line two".to_vec()]);
}

#[test]
fn test_shutdown_is_idempotent_and_final() {
    let fixture = Fixture::new();
    fixture.mount(Mock::given(path("/system/ping")).respond_with(ResponseTemplate::new(200).set_body_string("pong")));
    let client = fixture.client();
    client.ping().unwrap();

    client.shutdown();
    client.shutdown();
    assert!(!client.is_running());
    assert!(matches!(
        client.ping(),
        Err(ClientError::Carrier(CarrierError::AlreadyStopped))
    ));
}

#[test]
fn test_shutdown_before_first_call() {
    let client = BlockingClient::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
    client.shutdown();
    assert!(matches!(
        client.start(),
        Err(ClientError::Carrier(CarrierError::AlreadyStopped))
    ));
}

#[test]
fn test_trust_failure_surfaces_on_first_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig::new("https://127.0.0.1:9").with_custom_ca_cert(dir.path().join("missing.pem"));
    let client = BlockingClient::new(config).unwrap();

    assert!(matches!(client.ping(), Err(ClientError::Trust(_))));
    assert!(matches!(client.ping(), Err(ClientError::Trust(_))));
}

#[test]
fn test_clones_share_the_carrier() {
    let fixture = Fixture::new();
    fixture.mount(Mock::given(path("/system/ping")).respond_with(ResponseTemplate::new(200).set_body_string("pong")));
    let client = fixture.client();
    let staging = client.on_graph("staging");

    assert_eq!(staging.graph(), "staging");
    assert_eq!(staging.session_id(), client.session_id());
    staging.ping().unwrap();
    assert!(client.is_running());
    drop(staging);
    assert!(client.is_running());
}

#[test]
fn test_components_log_to_injected_dispatch() {
    let fixture = Fixture::new();
    fixture.mount(Mock::given(path("/system/ping")).respond_with(ResponseTemplate::new(200).set_body_string("pong")));
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let client =
        BlockingClient::with_dispatch(ClientConfig::new(fixture.server.uri()), tracing::Dispatch::new(subscriber))
            .unwrap();

    assert_eq!(client.ping().unwrap(), "pong");
    client.shutdown();

    let output = log.contents();
    assert!(output.contains("carrier thread started"), "{output}");
    assert!(output.contains("carto-client"), "{output}");
    assert!(output.contains("blocking client started"), "{output}");
    assert!(output.contains(client.session_id()), "{output}");
    assert!(output.contains("carrier thread stopped"), "{output}");
}
