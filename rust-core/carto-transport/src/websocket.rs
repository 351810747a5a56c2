// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! WebSocket duplex sessions.
//!
//! A reader task forwards text frames to the session's incoming queue; an
//! optional writer task drains the caller's outgoing queue. Whichever way the
//! session ends, exactly one [`Frame::Closed`] is queued after the last text
//! frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::{SinkExt, StreamExt};
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::instrument::WithSubscriber;
use tracing::{debug, warn, Dispatch};
use url::Url;

use crate::error::Result;

/// An item on a session's incoming queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame as sent by the core.
    Text(String),
    /// The session has ended; nothing follows.
    Closed,
}

/// An item to write to the core.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// Sent verbatim.
    Text(String),
    /// Sent as compact JSON.
    Json(Value),
}

impl Outgoing {
    fn into_frame(self) -> Message {
        let text = match self {
            Outgoing::Text(text) => text,
            Outgoing::Json(value) => value.to_string(),
        };
        Message::Text(format!("{text}\n"))
    }
}

pub(crate) struct SessionShared {
    closed: AtomicBool,
    incoming: UnboundedSender<Frame>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl SessionShared {
    /// Cancel both loops and queue the poison value. Only the first call acts.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        let _ = self.incoming.send(Frame::Closed);
    }

    fn register(&self, task: AbortHandle) {
        if self.closed.load(Ordering::Acquire) {
            task.abort();
            return;
        }
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

/// An open WebSocket session. Dropping it closes the session.
pub struct DuplexSession {
    incoming: UnboundedReceiver<Frame>,
    shared: Arc<SessionShared>,
    finished: bool,
}

impl DuplexSession {
    /// Next frame. Returns [`Frame::Closed`] once, then `None`.
    pub async fn recv(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        let frame = self.incoming.recv().await;
        if matches!(frame, Some(Frame::Closed) | None) {
            self.finished = true;
        }
        frame
    }

    /// Close the session. Idempotent.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether the session has been closed by either side.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionShared> {
        Arc::downgrade(&self.shared)
    }
}

impl Drop for DuplexSession {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for DuplexSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexSession")
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) async fn connect(
    url: Url,
    headers: HeaderMap,
    tls: Option<Arc<rustls::ClientConfig>>,
    outgoing: Option<UnboundedReceiver<Outgoing>>,
    dispatch: Dispatch,
) -> Result<DuplexSession> {
    let mut request = url.as_str().into_client_request()?;
    for (name, value) in headers.iter() {
        request.headers_mut().insert(name.clone(), value.clone());
    }
    let connector = match tls {
        Some(config) => Connector::Rustls(config),
        None => Connector::Plain,
    };

    debug!(url = %url.as_str().split('?').next().unwrap_or_default(), "opening websocket");
    let (socket, _) = connect_async_tls_with_config(request, None, false, Some(connector)).await?;
    let (mut sink, mut stream) = socket.split();

    let (incoming_tx, incoming_rx) = unbounded_channel();
    let shared = Arc::new(SessionShared {
        closed: AtomicBool::new(false),
        incoming: incoming_tx.clone(),
        tasks: Mutex::new(Vec::new()),
    });

    let reader_shared = Arc::clone(&shared);
    let reader = tokio::spawn(
        async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if incoming_tx.send(Frame::Text(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "websocket closed by core");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket read failed");
                        break;
                    }
                }
            }
            reader_shared.close();
        }
        .with_subscriber(dispatch.clone()),
    );
    shared.register(reader.abort_handle());

    if let Some(mut outgoing) = outgoing {
        let writer_shared = Arc::clone(&shared);
        let writer = tokio::spawn(
            async move {
                while let Some(item) = outgoing.recv().await {
                    if let Err(err) = sink.send(item.into_frame()).await {
                        warn!(error = %err, "websocket write failed");
                        writer_shared.close();
                        return;
                    }
                }
                let _ = sink.close().await;
            }
            .with_subscriber(dispatch),
        );
        shared.register(writer.abort_handle());
    }

    Ok(DuplexSession {
        incoming: incoming_rx,
        shared,
        finished: false,
    })
}
