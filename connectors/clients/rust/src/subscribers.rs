// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Event subscribers and their subscriptions.

use carto_transport::HttpRequest;

use crate::client::Client;
use crate::error::Result;
use crate::types::{Subscriber, Subscription};

impl Client {
    /// All registered subscribers.
    pub async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        self.call_json(HttpRequest::get("/subscribers")).await
    }

    /// Subscribers interested in `event_type`.
    pub async fn subscribers_for_event(&self, event_type: &str) -> Result<Vec<Subscriber>> {
        self.call_json(HttpRequest::get(format!("/subscribers/for/{event_type}")))
            .await
    }

    /// Subscriber `uid`, or `None` if it is not registered.
    pub async fn subscriber(&self, uid: &str) -> Result<Option<Subscriber>> {
        self.call_optional(HttpRequest::get(format!("/subscriber/{uid}"))).await
    }

    /// Replace the subscriptions of `uid`.
    pub async fn update_subscriber(&self, uid: &str, subscriptions: &[Subscription]) -> Result<Subscriber> {
        self.call_json(HttpRequest::put(format!("/subscriber/{uid}")).json(subscriptions)?)
            .await
    }

    /// Add one subscription to `uid`, registering the subscriber if needed.
    pub async fn add_subscription(&self, uid: &str, subscription: &Subscription) -> Result<Subscriber> {
        let request = HttpRequest::post(format!("/subscriber/{uid}/{}", subscription.message_type))
            .query("timeout", subscription.timeout.as_secs())
            .query("wait_for_completion", subscription.wait_for_completion);
        self.call_json(request).await
    }

    /// Remove one subscription of subscriber `uid`.
    pub async fn delete_subscription(&self, uid: &str, subscription: &Subscription) -> Result<Subscriber> {
        self.call_json(HttpRequest::delete(format!(
            "/subscriber/{uid}/{}",
            subscription.message_type
        )))
        .await
    }

    /// Remove subscriber `uid` with all its subscriptions.
    pub async fn delete_subscriber(&self, uid: &str) -> Result<()> {
        self.call_empty(HttpRequest::delete(format!("/subscriber/{uid}"))).await
    }
}
