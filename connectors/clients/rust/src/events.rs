// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! The core's event stream.

use carto_transport::{DuplexSession, Frame, Outgoing};
use futures::stream;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::{Client, JsonStream};
use crate::error::Result;

/// WebSocket path of the event stream.
pub const EVENTS_PATH: &str = "/events";

impl Client {
    /// Listen to core events.
    ///
    /// The stream ends when the connection closes or the client shuts down.
    /// Items sent on `outgoing` are delivered to the core as newline-terminated
    /// frames.
    ///
    /// # Arguments
    ///
    /// * `event_types` - Only these event types; all events when empty.
    /// * `outgoing`    - Optional queue of messages for the core.
    pub async fn events(&self, event_types: &[&str], outgoing: Option<UnboundedReceiver<Outgoing>>) -> Result<JsonStream> {
        let mut params = Vec::new();
        if !event_types.is_empty() {
            params.push(("show".to_string(), event_types.join(",")));
        }
        let session = self.transport().open_duplex(EVENTS_PATH, &params, outgoing).await?;
        Ok(Box::pin(stream::unfold(session, next_event)))
    }
}

async fn next_event(mut session: DuplexSession) -> Option<(Result<Value>, DuplexSession)> {
    match session.recv().await? {
        Frame::Text(text) => {
            let event = serde_json::from_str(&text).map_err(Into::into);
            Some((event, session))
        }
        Frame::Closed => None,
    }
}
