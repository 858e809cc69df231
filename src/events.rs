// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes event publishing with de-duplication.
//!
//! Lifecycle transitions (created, updated, invalid, ready) surface as
//! Normal or Warning events on the affected resource. Identical events
//! fired within a one second window are dropped so a hot reconcile loop
//! cannot flood the event store.

use crate::constants::EVENT_DEDUP_WINDOW_MILLIS;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta, Time};
use kube::api::PostParams;
use kube::{Api, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Converts a `chrono::DateTime<Utc>` into the `jiff::Timestamp` type that
/// `k8s-openapi`'s `Time`/`MicroTime` wrappers expect.
pub(crate) fn chrono_to_jiff(dt: chrono::DateTime<Utc>) -> k8s_openapi::jiff::Timestamp {
    k8s_openapi::jiff::Timestamp::from_nanosecond(dt.timestamp_nanos_opt().unwrap_or(0) as i128)
        .unwrap_or(k8s_openapi::jiff::Timestamp::UNIX_EPOCH)
}

/// Event severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    fn as_str(self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

/// The object an event is attached to.
#[derive(Clone, Debug)]
pub struct EventTarget {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
}

/// Sliding-window suppressor for identical events.
#[derive(Clone)]
pub struct EventDeduper {
    window: Duration,
    recent: Arc<Mutex<HashMap<String, Instant>>>,
}

impl EventDeduper {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether an event with this key may be published now. Accepting the
    /// key starts its suppression window.
    #[must_use]
    pub fn accept(&self, key: &str) -> bool {
        let mut recent = self.recent.lock().expect("event dedup poisoned");
        let now = Instant::now();
        recent.retain(|_, at| now.duration_since(*at) < self.window);
        if recent.contains_key(key) {
            return false;
        }
        recent.insert(key.to_string(), now);
        true
    }
}

/// De-duplicating event publisher.
#[derive(Clone)]
pub struct EventPublisher {
    client: Client,
    component: String,
    deduper: EventDeduper,
}

impl EventPublisher {
    #[must_use]
    pub fn new(client: Client, component: &str) -> Self {
        Self {
            client,
            component: component.to_string(),
            deduper: EventDeduper::new(Duration::from_millis(EVENT_DEDUP_WINDOW_MILLIS)),
        }
    }

    /// Publish one event unless an identical one fired within the window.
    ///
    /// Publishing failures are logged, never propagated: an event is worth
    /// a warning, not a failed reconcile.
    pub async fn publish(
        &self,
        target: &EventTarget,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        let dedup_key = format!(
            "{}/{}/{}/{}/{reason}/{message}",
            target.kind,
            target.namespace,
            target.name,
            event_type.as_str()
        );
        if !self.deduper.accept(&dedup_key) {
            debug!(reason = reason, object = %target.name, "event suppressed by dedup window");
            return;
        }

        let now = Utc::now();
        let event = Event {
            metadata: ObjectMeta {
                name: Some(format!(
                    "{}.{:x}",
                    target.name,
                    now.timestamp_nanos_opt().unwrap_or_default()
                )),
                namespace: Some(target.namespace.clone()),
                ..ObjectMeta::default()
            },
            involved_object: ObjectReference {
                api_version: Some(target.api_version.clone()),
                kind: Some(target.kind.clone()),
                name: Some(target.name.clone()),
                namespace: Some(target.namespace.clone()),
                uid: target.uid.clone(),
                ..ObjectReference::default()
            },
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            type_: Some(event_type.as_str().to_string()),
            source: Some(EventSource {
                component: Some(self.component.clone()),
                ..EventSource::default()
            }),
            first_timestamp: Some(Time(chrono_to_jiff(now))),
            last_timestamp: Some(Time(chrono_to_jiff(now))),
            event_time: Some(MicroTime(chrono_to_jiff(now))),
            count: Some(1),
            reporting_component: Some(self.component.clone()),
            reporting_instance: Some(self.component.clone()),
            ..Event::default()
        };

        let api: Api<Event> = Api::namespaced(self.client.clone(), &target.namespace);
        if let Err(e) = api.create(&PostParams::default(), &event).await {
            warn!(
                reason = reason,
                object = %format!("{}/{}", target.namespace, target.name),
                error = %e,
                "failed to publish event"
            );
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod events_tests;
