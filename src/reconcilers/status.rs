// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status patch helpers for the DNS resources.
//!
//! Status is written through the status subresource with merge patches.
//! Provider status carries a `lastUpdateTime` that must only move when the
//! status actually changed, so equality-modulo-timestamp is computed here.

use crate::crd::{DNSAnnotation, DNSEntry, DNSEntryStatus, DNSProvider, DNSProviderStatus};
use anyhow::Result;
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;

/// Compare provider statuses ignoring `lastUpdateTime`.
#[must_use]
pub fn provider_status_equal(a: &DNSProviderStatus, b: &DNSProviderStatus) -> bool {
    a.state == b.state
        && a.message == b.message
        && a.domains == b.domains
        && a.zones == b.zones
        && a.default_ttl == b.default_ttl
        && a.rate_limit == b.rate_limit
        && a.observed_generation == b.observed_generation
}

/// Write provider status if it differs from the current one.
///
/// `lastUpdateTime` is stamped only on actual changes.
///
/// # Errors
///
/// Returns an error if the status patch fails.
pub async fn update_provider_status(
    client: &Client,
    provider: &DNSProvider,
    mut status: DNSProviderStatus,
) -> Result<bool> {
    let unchanged = provider
        .status
        .as_ref()
        .is_some_and(|current| provider_status_equal(current, &status));
    if unchanged {
        return Ok(false);
    }

    status.last_update_time = Some(Utc::now().to_rfc3339());
    let namespace = provider.namespace().unwrap_or_default();
    let api: Api<DNSProvider> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &provider.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await?;
    Ok(true)
}

/// Write entry status if it differs from the current one.
///
/// # Errors
///
/// Returns an error if the status patch fails.
pub async fn update_entry_status(
    client: &Client,
    entry: &DNSEntry,
    status: DNSEntryStatus,
) -> Result<bool> {
    let unchanged = entry
        .status
        .as_ref()
        .is_some_and(|current| serde_json::to_value(current).ok() == serde_json::to_value(&status).ok());
    if unchanged {
        return Ok(false);
    }

    let namespace = entry.namespace().unwrap_or_default();
    let api: Api<DNSEntry> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &entry.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await?;
    Ok(true)
}

/// Write annotation status unconditionally.
///
/// # Errors
///
/// Returns an error if the status patch fails.
pub async fn update_annotation_status(
    client: &Client,
    annotation: &DNSAnnotation,
    state: &str,
    message: Option<&str>,
) -> Result<()> {
    let namespace = annotation.namespace().unwrap_or_default();
    let api: Api<DNSAnnotation> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &annotation.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&json!({
            "status": {
                "state": state,
                "message": message,
                "observedGeneration": annotation.metadata.generation,
            }
        })),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
