// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNSProvider reconciler.
//!
//! Each reconcile validates the provider's credentials, obtains (or
//! reuses) the account for them, lists the account's hosted zones, applies
//! the zone/domain filters, and publishes the result into the shared
//! provider registry for the entry reconciler. Deletion is deferred while
//! any DNSEntry still references the provider in its status.

pub mod selection;

use crate::account::rate_limit::RateLimiterOptions;
use crate::account::AccountConfig;
use crate::constants::{
    API_GROUP_VERSION, FINALIZER_COMPOUND, KIND_DNS_PROVIDER, PROVIDER_DELETE_MAX_BACKOFF_SECS,
    SECONDS_PER_DAY,
};
use crate::context::Context;
use crate::crd::{DNSProvider, DNSProviderStatus, RateLimit, SelectionStatus};
use crate::errors::ResourceState;
use crate::events::{EventTarget, EventType};
use crate::metrics;
use crate::reconcilers::finalizers::{ensure_finalizer, remove_finalizer};
use crate::reconcilers::status::update_provider_status;
use crate::registry::{ProviderState, SelectionResult};
use anyhow::{anyhow, Result};
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use selection::compute_selection;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Secret label marking a workload-identity token requestor.
const LABEL_WORKLOAD_IDENTITY_PURPOSE: &str = "security.gardener.cloud/purpose";

/// Expected value of [`LABEL_WORKLOAD_IDENTITY_PURPOSE`].
const WORKLOAD_IDENTITY_PURPOSE: &str = "workload-identity-token-requestor";

/// Property name a workload-identity token is injected under.
const PROPERTY_WORKLOAD_IDENTITY: &str = "workloadIdentityToken";

/// Secret data key holding the token in a workload-identity secret.
const DATA_KEY_TOKEN: &str = "token";

fn event_target(provider: &DNSProvider) -> EventTarget {
    EventTarget {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_DNS_PROVIDER.to_string(),
        namespace: provider.namespace().unwrap_or_default(),
        name: provider.name_any(),
        uid: provider.metadata.uid.clone(),
    }
}

/// Reconcile one DNSProvider.
///
/// Returns the requeue action: the sync period when healthy, the recheck
/// period on transient failures, or a deletion-deferral backoff.
///
/// # Errors
///
/// Returns an error for Kubernetes API failures; provider-level failures
/// are absorbed into status instead.
pub async fn reconcile_provider(ctx: Arc<Context>, provider: DNSProvider) -> Result<Action> {
    if !ctx.is_responsible(&provider) {
        debug!(provider = %provider.provider_key(), "class mismatch, ignoring provider");
        return Ok(Action::await_change());
    }

    if provider.metadata.deletion_timestamp.is_some() {
        return delete_provider(ctx, provider).await;
    }

    let key = provider.provider_key();
    let provider_config = &ctx.core.config.controllers.dns_provider;
    let provider_type = provider.spec.r#type.clone();

    // Type gating: disabled or unknown types are user errors.
    if !provider_config.provider_type_enabled(&provider_type)
        || !ctx.core.handlers.supports(&provider_type)
    {
        let message = format!("provider type {provider_type:?} is not supported");
        warn!(provider = %key, "{message}");
        publish_failure(&ctx, &provider, ResourceState::Invalid, &message).await?;
        return Ok(Action::await_change());
    }

    ensure_finalizer(&ctx.control_plane_client, &provider, FINALIZER_COMPOUND).await?;

    // Load credentials. In migration mode a missing secret finalizer is
    // expected; a missing secret is tolerated only as an Error status.
    let secret = match load_secret(&ctx, &provider).await {
        Ok(secret) => secret,
        Err(message) => {
            publish_failure(&ctx, &provider, ResourceState::Error, &message).await?;
            return Ok(Action::requeue(Duration::from_secs(
                provider_config.recheck_period,
            )));
        }
    };
    if !provider_config.migration_mode {
        ensure_finalizer(&ctx.client, &secret, FINALIZER_COMPOUND).await?;
    }

    let factory = ctx
        .core
        .handlers
        .get(&provider_type)
        .map_err(|e| anyhow!(e.to_string()))?;

    let properties = match secret_properties(&secret, factory.accepts_workload_identity()) {
        Ok(properties) => properties,
        Err(message) => {
            publish_failure(&ctx, &provider, ResourceState::Error, &message).await?;
            return Ok(Action::requeue(Duration::from_secs(
                provider_config.recheck_period,
            )));
        }
    };

    // Adapter validation runs before any handler is built.
    if let Err(e) = factory.validate(&properties, provider.spec.provider_config.as_ref()) {
        publish_failure(&ctx, &provider, ResourceState::Error, &e.to_string()).await?;
        return Ok(Action::requeue(Duration::from_secs(
            provider_config.recheck_period,
        )));
    }

    // Obtain the account under the provider's effective rate limits.
    let advanced = ctx.core.config.advanced_options(&provider_type);
    let rate_limit = effective_rate_limit(&ctx, &provider, &provider_type);
    let mut account_config = AccountConfig::new(&provider_type, properties);
    account_config.provider_config = provider.spec.provider_config.clone();
    account_config.rate_limit = rate_limit;
    account_config.zone_cache_ttl = Duration::from_secs(provider_config.zone_cache_ttl);
    if let Some(batch_size) = advanced.batch_size {
        account_config.batch_size = batch_size;
    }
    account_config.blocked_zones = advanced.blocked_zones.clone();

    let account = match ctx.core.accounts.get(&account_config) {
        Ok(account) => account,
        Err(e) => {
            publish_failure(&ctx, &provider, ResourceState::Error, &e.to_string()).await?;
            return Ok(Action::requeue(Duration::from_secs(
                provider_config.recheck_period,
            )));
        }
    };

    // The registry entry holds one account reference; release the
    // previous one (same or rotated credentials) now that a new one is
    // held.
    let previous = ctx.core.registry.get(&key);

    let zones = match account.get_zones().await {
        Ok(zones) => zones,
        Err(e) => {
            ctx.core.accounts.release(&account);
            publish_failure(&ctx, &provider, ResourceState::Error, &e.to_string()).await?;
            return Ok(Action::requeue(Duration::from_secs(
                provider_config.recheck_period,
            )));
        }
    };
    if zones.is_empty() {
        let selection = SelectionResult::default();
        publish_state(&ctx, &provider, ResourceState::Error, Some(account.clone()), selection);
        release_previous(&ctx, previous.as_deref());
        publish_failure(
            &ctx,
            &provider,
            ResourceState::Error,
            "account lists no hosted zones",
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(
            provider_config.recheck_period,
        )));
    }

    let selection = compute_selection(
        &zones,
        provider.spec.zones.as_ref(),
        provider.spec.domains.as_ref(),
    );
    for warning in &selection.warnings {
        ctx.events
            .publish(
                &event_target(&provider),
                EventType::Warning,
                "SelectionWarning",
                warning,
            )
            .await;
    }

    #[allow(clippy::cast_precision_loss)]
    metrics::PROVIDER_ZONES
        .with_label_values(&[&key])
        .set(selection.zones.len() as f64);

    let default_ttl = provider
        .spec
        .default_ttl
        .unwrap_or(provider_config.default_ttl);
    let status = DNSProviderStatus {
        state: Some(ResourceState::Ready.to_string()),
        message: Some(format!(
            "provider serves {} zone(s)",
            selection.zones.len()
        )),
        domains: Some(SelectionStatus {
            included: selection.included_domains.clone(),
            excluded: selection.excluded_domains.clone(),
        }),
        zones: Some(SelectionStatus {
            included: selection.zones.iter().map(|z| z.id.id.clone()).collect(),
            excluded: selection
                .excluded_zones
                .iter()
                .map(|z| z.id.clone())
                .collect(),
        }),
        default_ttl: Some(default_ttl),
        rate_limit: Some(echo_rate_limit(&provider, rate_limit)),
        observed_generation: provider.metadata.generation,
        last_update_time: None,
    };

    publish_state(
        &ctx,
        &provider,
        ResourceState::Ready,
        Some(account.clone()),
        selection,
    );
    release_previous(&ctx, previous.as_deref());

    if update_provider_status(&ctx.control_plane_client, &provider, status).await? {
        ctx.events
            .publish(
                &event_target(&provider),
                EventType::Normal,
                "Reconciled",
                "provider is ready",
            )
            .await;
    }
    info!(provider = %key, "provider reconciled");
    Ok(Action::requeue(Duration::from_secs(
        provider_config.sync_period,
    )))
}

/// Handle provider deletion.
///
/// Deletion blocks while entries still reference the provider; the
/// requeue interval grows with the age of the deletion timestamp, capped
/// at five minutes.
async fn delete_provider(ctx: Arc<Context>, provider: DNSProvider) -> Result<Action> {
    let key = provider.provider_key();
    let referencing = ctx.stores.entries_for_provider(&key);

    if !referencing.is_empty() {
        let message = format!(
            "deletion deferred: {} entr(ies) still assigned to this provider",
            referencing.len()
        );
        info!(provider = %key, "{message}");
        let status = DNSProviderStatus {
            state: Some(ResourceState::Deleting.to_string()),
            message: Some(message.clone()),
            observed_generation: provider.metadata.generation,
            ..provider.status.clone().unwrap_or_default()
        };
        update_provider_status(&ctx.control_plane_client, &provider, status).await?;

        let age = provider
            .metadata
            .deletion_timestamp
            .as_ref()
            .map(|t| (Utc::now().timestamp() - t.0.as_second()).max(1))
            .unwrap_or(1);
        #[allow(clippy::cast_sign_loss)]
        let backoff = (age as u64).min(PROVIDER_DELETE_MAX_BACKOFF_SECS);
        return Ok(Action::requeue(Duration::from_secs(backoff)));
    }

    // No more references: drop the registry entry, release the account,
    // and unblock the secret and the provider itself.
    if let Some(state) = ctx.core.registry.remove(&key) {
        if let Some(account) = &state.account {
            ctx.core.accounts.release(account);
        }
    }
    metrics::PROVIDER_ZONES.with_label_values(&[&key]).set(0.0);

    if !ctx.core.config.controllers.dns_provider.migration_mode {
        let secret_namespace = provider
            .spec
            .secret_ref
            .namespace
            .clone()
            .or_else(|| provider.namespace())
            .unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &secret_namespace);
        match secrets.get(&provider.spec.secret_ref.name).await {
            Ok(secret) => {
                remove_finalizer(&ctx.client, &secret, FINALIZER_COMPOUND).await?;
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(provider = %key, "referenced secret already gone");
            }
            Err(e) => return Err(e.into()),
        }
    }

    remove_finalizer(&ctx.control_plane_client, &provider, FINALIZER_COMPOUND).await?;
    info!(provider = %key, "provider deleted");
    Ok(Action::await_change())
}

/// Load the referenced credential secret, mapping failures to a message.
async fn load_secret(ctx: &Context, provider: &DNSProvider) -> Result<Secret, String> {
    let namespace = provider
        .spec
        .secret_ref
        .namespace
        .clone()
        .or_else(|| provider.namespace())
        .unwrap_or_default();
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);
    api.get(&provider.spec.secret_ref.name).await.map_err(|e| {
        format!(
            "cannot load secret {}/{}: {e}",
            namespace, provider.spec.secret_ref.name
        )
    })
}

/// Extract credential properties from the secret data.
///
/// A workload-identity token is injected as a property when the secret is
/// labeled as a token requestor and the handler type accepts it; a token
/// property supplied directly in the data keys is rejected so a user
/// cannot spoof an injected identity.
fn secret_properties(
    secret: &Secret,
    accepts_workload_identity: bool,
) -> Result<BTreeMap<String, String>, String> {
    let mut properties = BTreeMap::new();
    if let Some(data) = &secret.data {
        for (key, value) in data {
            let value = String::from_utf8(value.0.clone())
                .map_err(|_| format!("secret data key {key:?} is not valid UTF-8"))?;
            properties.insert(key.clone(), value);
        }
    }

    let labeled_for_identity = secret
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_WORKLOAD_IDENTITY_PURPOSE))
        .is_some_and(|purpose| purpose == WORKLOAD_IDENTITY_PURPOSE);

    if labeled_for_identity {
        if properties.contains_key(PROPERTY_WORKLOAD_IDENTITY) {
            return Err(format!(
                "secret must not supply {PROPERTY_WORKLOAD_IDENTITY:?} directly"
            ));
        }
        if accepts_workload_identity {
            let token = properties.remove(DATA_KEY_TOKEN).ok_or_else(|| {
                format!("workload-identity secret lacks the {DATA_KEY_TOKEN:?} data key")
            })?;
            properties.insert(PROPERTY_WORKLOAD_IDENTITY.to_string(), token);
        }
    }

    Ok(properties)
}

/// Effective rate limits: provider spec, then per-type advanced options,
/// then controller defaults.
fn effective_rate_limit(
    ctx: &Context,
    provider: &DNSProvider,
    provider_type: &str,
) -> RateLimiterOptions {
    if let Some(spec) = &provider.spec.rate_limit {
        #[allow(clippy::cast_sign_loss)]
        return RateLimiterOptions::from_requests_per_day(
            spec.requests_per_day.max(1) as u64,
            u32::try_from(spec.burst.max(1)).unwrap_or(1),
        );
    }
    let defaults = ctx
        .core
        .config
        .advanced_options(provider_type)
        .rate_limits
        .unwrap_or_else(|| {
            ctx.core
                .config
                .controllers
                .dns_provider
                .default_rate_limits
                .clone()
        });
    if defaults.enabled {
        RateLimiterOptions {
            qps: defaults.qps,
            burst: defaults.burst,
        }
    } else {
        // Effectively unlimited.
        RateLimiterOptions {
            qps: 1.0e6,
            burst: 1_000_000,
        }
    }
}

/// Rate limit echoed into status.
fn echo_rate_limit(provider: &DNSProvider, effective: RateLimiterOptions) -> RateLimit {
    provider.spec.rate_limit.clone().unwrap_or_else(|| {
        #[allow(clippy::cast_possible_truncation)]
        let requests_per_day = (effective.qps * SECONDS_PER_DAY) as i64;
        RateLimit {
            requests_per_day,
            burst: i64::from(effective.burst),
        }
    })
}

/// Publish a non-Ready state into the registry without an account change
/// and write the failure status.
async fn publish_failure(
    ctx: &Context,
    provider: &DNSProvider,
    state: ResourceState,
    message: &str,
) -> Result<()> {
    warn!(provider = %provider.provider_key(), state = %state, "{message}");
    let previous = ctx.core.registry.get(&provider.provider_key());
    let (account, selection) = previous
        .as_ref()
        .map(|p| (p.account.clone(), p.selection.clone()))
        .unwrap_or_default();
    ctx.core.registry.put(ProviderState {
        key: provider.provider_key(),
        provider_type: provider.spec.r#type.clone(),
        state,
        account,
        selection,
        default_ttl: provider
            .spec
            .default_ttl
            .unwrap_or(ctx.core.config.controllers.dns_provider.default_ttl),
    });

    let status = DNSProviderStatus {
        state: Some(state.to_string()),
        message: Some(message.to_string()),
        observed_generation: provider.metadata.generation,
        ..provider.status.clone().unwrap_or_default()
    };
    if update_provider_status(&ctx.control_plane_client, provider, status).await? {
        ctx.events
            .publish(
                &event_target(provider),
                EventType::Warning,
                "ReconcileFailed",
                message,
            )
            .await;
    }
    Ok(())
}

/// Publish a provider state carrying a fresh account reference.
fn publish_state(
    ctx: &Context,
    provider: &DNSProvider,
    state: ResourceState,
    account: Option<Arc<crate::account::Account>>,
    selection: SelectionResult,
) {
    ctx.core.registry.put(ProviderState {
        key: provider.provider_key(),
        provider_type: provider.spec.r#type.clone(),
        state,
        account,
        selection,
        default_ttl: provider
            .spec
            .default_ttl
            .unwrap_or(ctx.core.config.controllers.dns_provider.default_ttl),
    });
}

/// Release the account reference held by a replaced registry entry.
fn release_previous(ctx: &Context, previous: Option<&ProviderState>) {
    if let Some(state) = previous {
        if let Some(account) = &state.account {
            ctx.core.accounts.release(account);
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
