// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNSAnnotation reconciler.
//!
//! A DNSAnnotation attaches DNS annotations to another resource without
//! editing it. The reconciler validates the reference (same-namespace
//! only), merges all annotations targeting the same referent, and
//! publishes the result into the in-memory overlay consulted by the
//! source controllers and the entry reconciler. When several annotations
//! declare conflicting values for one key, the lexicographically smallest
//! value wins so the outcome does not depend on processing order.

use crate::constants::FINALIZER_COMPOUND;
use crate::context::{AnnotationOverlay, Context};
use crate::crd::DNSAnnotation;
use crate::errors::ResourceState;
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use crate::reconcilers::status::update_annotation_status;
use anyhow::Result;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconcile one DNSAnnotation.
///
/// # Errors
///
/// Returns an error for Kubernetes API failures.
pub async fn reconcile_annotation(ctx: Arc<Context>, annotation: DNSAnnotation) -> Result<Action> {
    if !ctx.is_responsible(&annotation) {
        debug!(annotation = %annotation.name_any(), "class mismatch, ignoring annotation");
        return Ok(Action::await_change());
    }

    let namespace = annotation.namespace().unwrap_or_default();
    let overlay_key = referent_key(&annotation, &namespace);

    if annotation.metadata.deletion_timestamp.is_some() {
        rebuild_overlay_for(&ctx, &overlay_key, Some(&annotation));
        remove_finalizer(&ctx.control_plane_client, &annotation, FINALIZER_COMPOUND).await?;
        info!(annotation = %annotation.name_any(), "annotation removed from overlay");
        return Ok(Action::await_change());
    }

    // Same-namespace referencing only: decorating resources elsewhere
    // would be a privilege escalation.
    let referent = &annotation.spec.resource_ref;
    if referent
        .namespace
        .as_ref()
        .is_some_and(|ns| ns != &namespace)
    {
        update_annotation_status(
            &ctx.control_plane_client,
            &annotation,
            ResourceState::Invalid.as_str(),
            Some("resourceRef must reference the annotation's own namespace"),
        )
        .await?;
        return Ok(Action::await_change());
    }
    if referent.api_version.is_empty() || referent.kind.is_empty() || referent.name.is_empty() {
        update_annotation_status(
            &ctx.control_plane_client,
            &annotation,
            ResourceState::Invalid.as_str(),
            Some("resourceRef requires apiVersion, kind, and name"),
        )
        .await?;
        return Ok(Action::await_change());
    }

    ensure_finalizer(&ctx.control_plane_client, &annotation, FINALIZER_COMPOUND).await?;
    rebuild_overlay_for(&ctx, &overlay_key, None);
    update_annotation_status(
        &ctx.control_plane_client,
        &annotation,
        ResourceState::Ready.as_str(),
        None,
    )
    .await?;
    Ok(Action::await_change())
}

/// Overlay key of the referenced object.
fn referent_key(annotation: &DNSAnnotation, fallback_namespace: &str) -> String {
    let referent = &annotation.spec.resource_ref;
    AnnotationOverlay::overlay_key(
        &referent.api_version,
        &referent.kind,
        referent
            .namespace
            .as_deref()
            .unwrap_or(fallback_namespace),
        &referent.name,
    )
}

/// Merge the annotation maps of all live DNSAnnotations targeting one
/// referent.
///
/// `excluded` names an annotation being deleted whose contribution must
/// be dropped even though the store may still list it.
fn merge_for_referent<I>(
    candidates: I,
    overlay_key: &str,
    excluded: Option<&DNSAnnotation>,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = Arc<DNSAnnotation>>,
{
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for candidate in candidates {
        if candidate.metadata.deletion_timestamp.is_some() {
            continue;
        }
        if let Some(excluded) = excluded {
            if candidate.name_any() == excluded.name_any()
                && candidate.namespace() == excluded.namespace()
            {
                continue;
            }
        }
        let namespace = candidate.namespace().unwrap_or_default();
        if referent_key(&candidate, &namespace) != overlay_key {
            continue;
        }
        for (key, value) in &candidate.spec.annotations {
            match merged.get(key) {
                // Conflicting values: the smallest wins, deterministically.
                Some(existing) if existing <= value => {}
                _ => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
    }
    merged
}

/// Recompute the merged overlay for one referent from the store.
fn rebuild_overlay_for(ctx: &Context, overlay_key: &str, excluded: Option<&DNSAnnotation>) {
    let merged = merge_for_referent(ctx.stores.annotations.state(), overlay_key, excluded);
    if merged.is_empty() {
        ctx.overlay.remove(overlay_key);
    } else {
        ctx.overlay.put(overlay_key, merged);
    }
}

#[cfg(test)]
#[path = "annotation_tests.rs"]
mod annotation_tests;
