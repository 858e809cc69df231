// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNSEntry reconciler.
//!
//! The kube-facing half of the entry controller: class scoping, the
//! ignore annotations, the post-update debounce, dns-name locks,
//! finalizer and lookup-job bookkeeping, status patches and events. The
//! actual planning and execution lives in [`plan`].

pub mod diff;
pub mod plan;
pub mod targets;

use crate::constants::{
    ANNOTATION_IGNORE, ANNOTATION_OPERATION, ANNOTATION_TARGET_HARD_IGNORE, API_GROUP_VERSION,
    ERROR_REQUEUE_DURATION_SECS, FINALIZER_COMPOUND, KIND_DNS_ENTRY, LOCK_REQUEUE_BASE_MILLIS,
    LOCK_REQUEUE_JITTER_MILLIS, OPERATION_RECONCILE,
};
use crate::context::{AnnotationOverlay, Context};
use crate::crd::{DNSEntry, DNSEntryStatus};
use crate::dns::name;
use crate::errors::ResourceState;
use crate::events::{EventTarget, EventType};
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use crate::reconcilers::status::update_entry_status;
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use plan::{plan_and_execute, EntryPlanInput, PlanOutcome};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

fn event_target(entry: &DNSEntry) -> EventTarget {
    EventTarget {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_DNS_ENTRY.to_string(),
        namespace: entry.namespace().unwrap_or_default(),
        name: entry.name_any(),
        uid: entry.metadata.uid.clone(),
    }
}

/// Entry annotations merged with any DNSAnnotation overlay for the entry.
fn merged_annotations(overlay: &AnnotationOverlay, entry: &DNSEntry) -> BTreeMap<String, String> {
    let mut annotations = entry.annotations().clone();
    let key = AnnotationOverlay::overlay_key(
        API_GROUP_VERSION,
        KIND_DNS_ENTRY,
        &entry.namespace().unwrap_or_default(),
        &entry.name_any(),
    );
    if let Some(extra) = overlay.get(&key) {
        annotations.extend(extra);
    }
    annotations
}

/// Reconcile one DNSEntry.
///
/// All failures are absorbed into status; the returned action encodes the
/// requeue decision.
///
/// # Errors
///
/// Returns an error only for Kubernetes API failures while patching
/// metadata or status.
pub async fn reconcile_entry(ctx: Arc<Context>, entry: DNSEntry) -> Result<Action> {
    if !ctx.is_responsible(&entry) {
        debug!(entry = %entry.entry_key(), "class mismatch, ignoring entry");
        return Ok(Action::await_change());
    }

    let key = entry.entry_key();
    let namespace = entry.namespace().unwrap_or_default();
    let api: Api<DNSEntry> = Api::namespaced(ctx.client.clone(), &namespace);
    let annotations = merged_annotations(&ctx.overlay, &entry);
    let deleting = entry.metadata.deletion_timestamp.is_some();

    // A forced reconcile (written by the lookup processor) bypasses the
    // debounce; consume the annotation so it fires only once.
    if annotations.get(ANNOTATION_OPERATION).map(String::as_str) == Some(OPERATION_RECONCILE) {
        ctx.core.debounce.clear(&key);
        api.patch(
            &entry.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&json!({
                "metadata": { "annotations": { ANNOTATION_OPERATION: null } }
            })),
        )
        .await?;
    }

    // Ignore annotations.
    match annotations.get(ANNOTATION_IGNORE).map(String::as_str) {
        Some("full") => {
            info!(entry = %key, "ignore=full: releasing entry");
            remove_finalizer(&ctx.client, &entry, FINALIZER_COMPOUND).await?;
            write_status(&ctx, &entry, ignored_status(&entry)).await?;
            return Ok(Action::await_change());
        }
        Some("true" | "reconcile") => {
            info!(entry = %key, "ignore annotation set: skipping reconciliation");
            write_status(&ctx, &entry, ignored_status(&entry)).await?;
            return Ok(Action::await_change());
        }
        _ => {}
    }
    if deleting
        && annotations
            .get(ANNOTATION_TARGET_HARD_IGNORE)
            .map(String::as_str)
            == Some("true")
    {
        info!(entry = %key, "target-hard-ignore: skipping deletion cleanup");
        ctx.core.lookups.delete(&key);
        remove_finalizer(&ctx.client, &entry, FINALIZER_COMPOUND).await?;
        return Ok(Action::await_change());
    }

    // Post-update debounce: let the authoritative nameservers converge.
    if let Some(remaining) = ctx.core.debounce.remaining(&key) {
        debug!(entry = %key, "within post-update debounce, requeueing");
        return Ok(Action::requeue(remaining));
    }

    // Lock both the desired name and the previously written one.
    let spec_name = name::normalize(&entry.spec.dns_name);
    let status_name = entry
        .status
        .as_ref()
        .and_then(|s| s.dns_name.clone())
        .unwrap_or_default();
    let names: Vec<&str> = if status_name.is_empty() || status_name == spec_name {
        vec![spec_name.as_str()]
    } else {
        vec![spec_name.as_str(), status_name.as_str()]
    };
    let Some(_guard) = ctx.core.locks.try_lock(&names) else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let jitter = (rand::random::<f64>() * LOCK_REQUEUE_JITTER_MILLIS as f64) as u64;
        debug!(entry = %key, "dns name locked elsewhere, requeueing");
        return Ok(Action::requeue(Duration::from_millis(
            LOCK_REQUEUE_BASE_MILLIS + jitter,
        )));
    };

    if !deleting {
        ensure_finalizer(&ctx.client, &entry, FINALIZER_COMPOUND).await?;
    }

    let timeout = Duration::from_secs(
        ctx.core
            .config
            .controllers
            .dns_entry
            .reconciliation_timeout,
    );
    let input = EntryPlanInput {
        entry_key: key.clone(),
        spec: entry.spec.clone(),
        status: entry.status.clone().unwrap_or_default(),
        annotations,
        deleting,
    };
    let planned = match tokio::time::timeout(timeout, plan_and_execute(&ctx.core, &input)).await {
        Ok(result) => result,
        Err(_) => Err(crate::errors::ReconcileError::Transient(
            "reconciliation timed out".to_string(),
        )),
    };

    match planned {
        Ok(outcome) => {
            apply_lookup_update(&ctx, &key, &outcome).await;

            if deleting {
                ctx.core.lookups.delete(&key);
                if outcome.records_present {
                    // Cleanup is blocked (no account serves the old zone,
                    // or the provider is not ready). Removing the
                    // finalizer now would orphan the records.
                    write_status(&ctx, &entry, outcome_status(&entry, &outcome)).await?;
                    return Ok(Action::requeue(Duration::from_secs(
                        crate::constants::DEFAULT_RECHECK_PERIOD_SECS,
                    )));
                }
                remove_finalizer(&ctx.client, &entry, FINALIZER_COMPOUND).await?;
                info!(entry = %key, "entry deleted");
                return Ok(Action::await_change());
            }

            let state = outcome.state;
            write_status(&ctx, &entry, outcome_status(&entry, &outcome)).await?;
            match state {
                ResourceState::Ready => {
                    if input.status.state.as_deref() != Some("Ready") {
                        ctx.events
                            .publish(
                                &event_target(&entry),
                                EventType::Normal,
                                "Reconciled",
                                "dns entry is ready",
                            )
                            .await;
                    }
                    Ok(Action::await_change())
                }
                ResourceState::Stale => {
                    ctx.events
                        .publish(
                            &event_target(&entry),
                            EventType::Warning,
                            "Stale",
                            &outcome_message(&outcome),
                        )
                        .await;
                    Ok(Action::requeue(Duration::from_secs(
                        crate::constants::DEFAULT_RECHECK_PERIOD_SECS,
                    )))
                }
                _ => Ok(Action::await_change()),
            }
        }
        Err(e) => {
            let state = e.state();
            warn!(entry = %key, state = %state, error = %e, "entry reconciliation failed");
            let status = DNSEntryStatus {
                state: Some(state.to_string()),
                message: Some(e.to_string()),
                observed_generation: entry.metadata.generation,
                ..entry.status.clone().unwrap_or_default()
            };
            write_status(&ctx, &entry, status).await?;
            ctx.events
                .publish(
                    &event_target(&entry),
                    EventType::Warning,
                    if state == ResourceState::Invalid {
                        "Invalid"
                    } else {
                        "ReconcileFailed"
                    },
                    &e.to_string(),
                )
                .await;
            if e.retryable() {
                Ok(Action::requeue(Duration::from_secs(
                    ERROR_REQUEUE_DURATION_SECS,
                )))
            } else {
                Ok(Action::await_change())
            }
        }
    }
}

fn outcome_message(outcome: &PlanOutcome) -> String {
    outcome.message.clone()
}

fn ignored_status(entry: &DNSEntry) -> DNSEntryStatus {
    DNSEntryStatus {
        state: Some(ResourceState::Ignored.to_string()),
        message: Some("ignored via annotation".to_string()),
        observed_generation: entry.metadata.generation,
        ..entry.status.clone().unwrap_or_default()
    }
}

fn outcome_status(entry: &DNSEntry, outcome: &PlanOutcome) -> DNSEntryStatus {
    DNSEntryStatus {
        state: Some(outcome.state.to_string()),
        message: Some(outcome.message.clone()),
        provider: outcome.provider.clone(),
        provider_type: outcome.provider_type.clone(),
        zone: outcome.zone.clone(),
        dns_name: outcome.dns_name.clone(),
        targets: outcome.targets.clone(),
        ttl: outcome.ttl,
        routing_policy: outcome.routing_policy.clone(),
        observed_generation: entry.metadata.generation,
    }
}

async fn write_status(ctx: &Context, entry: &DNSEntry, status: DNSEntryStatus) -> Result<()> {
    update_entry_status(&ctx.client, entry, status).await?;
    Ok(())
}

/// Keep the lookup processor in sync with the plan's expansion result.
async fn apply_lookup_update(ctx: &Context, entry_key: &str, outcome: &PlanOutcome) {
    if let Some(update) = &outcome.lookup {
        ctx.core
            .lookups
            .upsert(
                entry_key,
                update.hostnames.clone(),
                update.result.clone(),
                update.interval,
            )
            .await;
    } else {
        ctx.core.lookups.delete(entry_key);
    }
}

/// Production [`crate::lookup::ReconcileTrigger`]: writes the operation
/// annotation on the entry, which bypasses the debounce on the next pass.
pub struct AnnotationTrigger {
    pub client: kube::Client,
}

#[async_trait::async_trait]
impl crate::lookup::ReconcileTrigger for AnnotationTrigger {
    async fn trigger(&self, entry_key: &str) {
        let Some((namespace, entry_name)) = entry_key.split_once('/') else {
            warn!(entry = entry_key, "malformed entry key, cannot trigger");
            return;
        };
        let api: Api<DNSEntry> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "metadata": { "annotations": { ANNOTATION_OPERATION: OPERATION_RECONCILE } }
        });
        if let Err(e) = api
            .patch(entry_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            warn!(entry = entry_key, error = %e, "failed to trigger reconciliation");
        }
    }
}
