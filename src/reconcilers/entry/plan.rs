// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Planning and execution core of the entry reconciler.
//!
//! Everything between "the spec is worth looking at" and "status should
//! now say X" lives here: spec validation, provider selection, target
//! expansion, observation, diffing, and change execution. The module has
//! no Kubernetes client dependency; the kube-facing wrapper in `mod.rs`
//! handles locks, debounce, annotations, finalizers, and status patches.

use crate::account::Account;
use crate::context::CoreContext;
use crate::crd::{DNSEntrySpec, DNSEntryStatus, RoutingPolicySpec};
use crate::dns::{
    ensure_quoted_text, name, record_sets_from_targets, DnsSetName, RecordSet, RecordType,
    RoutingPolicy, ZoneId,
};
use crate::errors::{ReconcileError, ResourceState};
use crate::metrics;
use crate::provider::{ChangeResultCollector, ChangeRequest};
use crate::registry::{ProviderState, SelectionMatch};
use crate::resolver::HostsLookupResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::diff::{compute_changes, is_noop, ObservedRecordSet, ZonedChanges};
use super::targets::{expand_targets, ExpansionOutcome, IpStack};

/// Record types checked when observing an entry's locations.
///
/// NS records are never written by entries, so they are not observed.
const OBSERVED_TYPES: [RecordType; 4] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::TXT,
];

/// Floor for the CNAME re-expansion interval.
const MIN_LOOKUP_INTERVAL_SECS: u64 = 30;

/// Input of one planning pass.
pub struct EntryPlanInput {
    /// `namespace/name` of the entry
    pub entry_key: String,
    pub spec: DNSEntrySpec,
    /// Previous status (empty default when the entry is new)
    pub status: DNSEntryStatus,
    /// Effective annotations (resource annotations plus overlay)
    pub annotations: BTreeMap<String, String>,
    /// Entry has a deletion timestamp: desired state is empty
    pub deleting: bool,
}

/// Lookup-processor update requested by a plan.
#[derive(Debug)]
pub struct LookupUpdate {
    pub hostnames: Vec<String>,
    pub result: HostsLookupResult,
    pub interval: Duration,
}

/// Result of one planning pass.
#[derive(Debug)]
pub struct PlanOutcome {
    pub state: ResourceState,
    pub message: String,
    pub provider: Option<String>,
    pub provider_type: Option<String>,
    pub zone: Option<String>,
    pub dns_name: Option<String>,
    pub targets: Option<Vec<String>>,
    pub ttl: Option<i64>,
    pub routing_policy: Option<RoutingPolicySpec>,
    /// Records exist (or were just written): the finalizer must stay
    pub records_present: bool,
    /// Number of change requests executed
    pub executed: usize,
    /// Requested lookup-processor update; `None` removes any job
    pub lookup: Option<LookupUpdate>,
}

impl PlanOutcome {
    fn stale(status: &DNSEntryStatus, message: String) -> Self {
        Self {
            state: ResourceState::Stale,
            message,
            provider: status.provider.clone(),
            provider_type: status.provider_type.clone(),
            zone: status.zone.clone(),
            dns_name: status.dns_name.clone(),
            targets: status.targets.clone(),
            ttl: status.ttl,
            routing_policy: status.routing_policy.clone(),
            records_present: status.zone.is_some(),
            executed: 0,
            lookup: None,
        }
    }
}

/// Validate the user-facing spec. Failures are `Invalid` and not retried.
fn validate_spec(spec: &DNSEntrySpec) -> Result<(), ReconcileError> {
    if !name::is_valid(&spec.dns_name) {
        return Err(ReconcileError::Invalid(format!(
            "invalid dnsName {:?}",
            spec.dns_name
        )));
    }

    let targets = spec.targets.as_deref().unwrap_or_default();
    let text = spec.text.as_deref().unwrap_or_default();
    if !targets.is_empty() && !text.is_empty() {
        return Err(ReconcileError::Invalid(
            "cannot specify both targets and text fields".to_string(),
        ));
    }
    if targets.is_empty() && text.is_empty() {
        return Err(ReconcileError::Invalid(
            "one of targets or text must be specified".to_string(),
        ));
    }

    for (label, values) in [("targets", targets), ("text", text)] {
        for (i, value) in values.iter().enumerate() {
            if value.trim().is_empty() {
                return Err(ReconcileError::Invalid(format!(
                    "{label}[{i}] must not be empty"
                )));
            }
            if values[..i].contains(value) {
                return Err(ReconcileError::Invalid(format!(
                    "duplicate value {value:?} in {label}"
                )));
            }
        }
    }
    Ok(())
}

/// Pick the best provider for a dns name.
///
/// Longest matched domain suffix wins; ties prefer a Ready provider, then
/// the stable `(namespace, name)` order of the snapshot.
fn select_provider(
    registry: &crate::registry::ProviderRegistry,
    dns_name: &str,
) -> Option<(Arc<ProviderState>, SelectionMatch)> {
    let mut best: Option<(Arc<ProviderState>, SelectionMatch)> = None;
    for state in registry.snapshot() {
        let Some(matched) = state.selection.match_for(dns_name) else {
            continue;
        };
        let replace = match &best {
            None => true,
            Some((best_state, best_match)) => {
                matched.match_length > best_match.match_length
                    || (matched.match_length == best_match.match_length
                        && state.is_ready()
                        && !best_state.is_ready())
            }
        };
        if replace {
            best = Some((state, matched));
        }
    }
    best
}

/// Effective lookup interval: spec, annotation, then the configured
/// default, floored.
fn lookup_interval(core: &CoreContext, input: &EntryPlanInput) -> Duration {
    let annotated = input
        .annotations
        .get(crate::constants::ANNOTATION_CNAME_LOOKUP_INTERVAL)
        .and_then(|v| v.parse::<u64>().ok());
    #[allow(clippy::cast_sign_loss)]
    let seconds = input
        .spec
        .cname_lookup_interval
        .map(|v| v.max(0) as u64)
        .or(annotated)
        .unwrap_or(core.config.controllers.dns_entry.default_cname_lookup_interval);
    Duration::from_secs(seconds.max(MIN_LOOKUP_INTERVAL_SECS))
}

/// Whether target expansion is requested by spec or annotation.
fn resolve_requested(input: &EntryPlanInput) -> bool {
    input.spec.resolve_targets_to_addresses.unwrap_or(false)
        || input
            .annotations
            .get(crate::constants::ANNOTATION_RESOLVE_TARGETS)
            .map(String::as_str)
            == Some("true")
}

/// Plan and execute one reconcile pass for an entry.
///
/// # Errors
///
/// - [`ReconcileError::Invalid`] for spec errors
/// - [`ReconcileError::Transient`] for provider/API/lookup failures
pub async fn plan_and_execute(
    core: &CoreContext,
    input: &EntryPlanInput,
) -> Result<PlanOutcome, ReconcileError> {
    if !input.deleting {
        validate_spec(&input.spec)?;
    }

    let dns_name = name::normalize(&input.spec.dns_name);
    let set_identifier = input
        .spec
        .routing_policy
        .as_ref()
        .map(|p| p.set_identifier.clone())
        .unwrap_or_default();
    let set_name = DnsSetName::new(&dns_name, &set_identifier);

    // Provider selection.
    let selected = select_provider(&core.registry, &dns_name);
    let Some((provider_state, matched)) = selected else {
        if input.deleting {
            // No provider left; clean up through whatever account still
            // claims the old zone.
            return cleanup_without_provider(core, input, &set_name).await;
        }
        if input.status.provider.is_some() || input.status.zone.is_some() {
            return Ok(PlanOutcome::stale(
                &input.status,
                "no matching DNSProvider available; keeping existing records".to_string(),
            ));
        }
        return Err(ReconcileError::Transient(format!(
            "no DNSProvider found for {dns_name:?}"
        )));
    };

    if !provider_state.is_ready() {
        return Ok(PlanOutcome::stale(
            &input.status,
            format!(
                "DNSProvider {} is not ready; keeping existing records",
                provider_state.key
            ),
        ));
    }
    let account = provider_state
        .account
        .clone()
        .ok_or_else(|| ReconcileError::Transient("provider has no account".to_string()))?;

    let ttl = input.spec.ttl.unwrap_or(provider_state.default_ttl);
    let routing_policy = input.spec.routing_policy.as_ref().map(|p| {
        RoutingPolicy::new(p.r#type.clone(), p.parameters.clone())
    });

    // Desired record sets plus the effective targets for status.
    let mut lookup_update = None;
    let (desired, effective_targets): (BTreeMap<RecordType, RecordSet>, Vec<String>) =
        if input.deleting {
            (BTreeMap::new(), Vec::new())
        } else if let Some(text) = input.spec.text.as_ref().filter(|t| !t.is_empty()) {
            let values: Vec<String> = text.iter().map(|t| ensure_quoted_text(t)).collect();
            let mut set = RecordSet::new(RecordType::TXT, ttl, values.clone());
            set.routing_policy = routing_policy.clone();
            (BTreeMap::from([(RecordType::TXT, set)]), values)
        } else {
            let raw = input.spec.targets.clone().unwrap_or_default();
            let expansion = expand_targets(
                core.resolver.clone(),
                &raw,
                resolve_requested(input),
                IpStack::from_annotations(&input.annotations),
            )
            .await?;
            let ExpansionOutcome {
                targets,
                hostnames,
                lookup_result,
                deferred,
            } = expansion;
            if !hostnames.is_empty() {
                if let Some(result) = lookup_result {
                    lookup_update = Some(LookupUpdate {
                        hostnames,
                        result,
                        interval: lookup_interval(core, input),
                    });
                }
            }
            if deferred {
                let mut outcome = PlanOutcome::stale(
                    &input.status,
                    "target address lookup timed out; keeping existing records".to_string(),
                );
                outcome.lookup = lookup_update;
                return Ok(outcome);
            }

            let mapped = account.handler().map_targets(&dns_name, targets);
            let mut sets = record_sets_from_targets(&mapped, ttl);
            for set in sets.values_mut() {
                set.routing_policy = routing_policy.clone();
            }
            let values = mapped.into_iter().map(|t| t.value).collect();
            (sets, values)
        };

    // Observation: old location (from status) and new location.
    let new_zone = matched.zone.clone();
    let mut locations: Vec<(ZoneId, DnsSetName)> = vec![(new_zone.clone(), set_name.clone())];
    if let Some(old) = old_location(&input.status) {
        if !locations.contains(&old) {
            locations.push(old);
        }
    }

    let mut observed: Vec<ObservedRecordSet> = Vec::new();
    let mut zone_accounts: BTreeMap<ZoneId, Arc<Account>> = BTreeMap::new();
    zone_accounts.insert(new_zone.clone(), account.clone());

    for (zone, location_name) in &locations {
        let zone_account = match zone_accounts.get(zone) {
            Some(existing) => existing.clone(),
            None => match core.accounts.find_account_for_zone(zone).await {
                Some(found) => {
                    zone_accounts.insert(zone.clone(), found.clone());
                    found
                }
                None => {
                    // The previous zone has no live account; deleting its
                    // records is impossible right now. Do not pretend
                    // they are gone.
                    return Ok(PlanOutcome::stale(
                        &input.status,
                        format!("no account serves previous zone {zone}; records kept"),
                    ));
                }
            },
        };
        collect_observed(&zone_account, zone, location_name, &mut observed).await?;
    }

    let changes = compute_changes(&new_zone, &set_name, &desired, &observed);
    if is_noop(&changes) {
        debug!(entry = %input.entry_key, "desired state already present");
        return Ok(finish(
            input,
            &provider_state,
            &matched,
            &dns_name,
            effective_targets,
            ttl,
            desired.is_empty(),
            0,
            lookup_update,
        ));
    }

    // Invalidate the touched keys so post-execution reads re-query, and
    // stamp the debounce window before the records change underneath the
    // authoritative nameservers.
    for (zone, requests) in &changes {
        if let Some(zone_account) = zone_accounts.get(zone) {
            let keys: Vec<(DnsSetName, RecordType)> = requests
                .iter()
                .map(|r| (r.name.clone(), r.rtype))
                .collect();
            zone_account.dns_cache().invalidate(&keys);
        }
    }
    core.debounce.mark_updated(&input.entry_key);

    let executed = execute_changes(&new_zone, &changes, &zone_accounts).await?;
    info!(
        entry = %input.entry_key,
        changes = executed,
        zone = %new_zone,
        "executed change requests"
    );

    Ok(finish(
        input,
        &provider_state,
        &matched,
        &dns_name,
        effective_targets,
        ttl,
        desired.is_empty(),
        executed,
        lookup_update,
    ))
}

/// Observed location recorded in a previous status, if any.
fn old_location(status: &DNSEntryStatus) -> Option<(ZoneId, DnsSetName)> {
    let zone = status.zone.as_ref()?;
    let provider_type = status.provider_type.as_ref()?;
    let dns_name = status.dns_name.as_ref()?;
    let set_identifier = status
        .routing_policy
        .as_ref()
        .map(|p| p.set_identifier.clone())
        .unwrap_or_default();
    Some((
        ZoneId::new(provider_type.clone(), zone.clone()),
        DnsSetName::new(dns_name, &set_identifier),
    ))
}

/// Read everything observed for one `(zone, name)` location.
///
/// Plain names go through the authoritative DNS cache; routing-policy
/// variants cannot be told apart by plain DNS and are read from the
/// provider zone state instead.
async fn collect_observed(
    account: &Arc<Account>,
    zone: &ZoneId,
    location: &DnsSetName,
    observed: &mut Vec<ObservedRecordSet>,
) -> Result<(), ReconcileError> {
    if location.set_identifier.is_empty() {
        let zone_domain = account
            .zone_domain(zone)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?;
        for rtype in OBSERVED_TYPES {
            let answer = account
                .dns_cache()
                .get(&zone_domain, location, rtype)
                .await
                .map_err(|e| ReconcileError::Transient(e.to_string()))?;
            if let Some(record_set) = answer {
                observed.push(ObservedRecordSet {
                    zone: zone.clone(),
                    name: location.clone(),
                    record_set,
                });
            }
        }
        return Ok(());
    }

    let state = account
        .get_zone_state(zone)
        .await
        .map_err(|e| ReconcileError::Transient(e.to_string()))?;
    if let Some(dns_set) = state.get(location) {
        for record_set in dns_set.sets.values() {
            observed.push(ObservedRecordSet {
                zone: zone.clone(),
                name: location.clone(),
                record_set: record_set.clone(),
            });
        }
    }
    Ok(())
}

/// Execute grouped changes: cross-zone deletions first, the target zone
/// last.
async fn execute_changes(
    new_zone: &ZoneId,
    changes: &ZonedChanges,
    zone_accounts: &BTreeMap<ZoneId, Arc<Account>>,
) -> Result<usize, ReconcileError> {
    let mut executed = 0;
    let mut ordered: Vec<(&ZoneId, &Vec<ChangeRequest>)> = changes
        .iter()
        .filter(|(zone, requests)| *zone != new_zone && !requests.is_empty())
        .collect();
    if let Some(requests) = changes.get(new_zone).filter(|r| !r.is_empty()) {
        ordered.push((new_zone, requests));
    }

    for (zone, requests) in ordered {
        let account = zone_accounts.get(zone).ok_or_else(|| {
            ReconcileError::Transient(format!("no account available for zone {zone}"))
        })?;
        let collector = ChangeResultCollector::new();
        account
            .execute_requests(zone, requests, &collector)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?;

        let results = collector.results();
        for request in requests {
            // Per-request metrics; failures are itemized below.
            metrics::record_change_request(&request.action.to_string(), "submitted");
        }
        executed += results.succeeded;
        if !results.all_succeeded() {
            let detail = results
                .failures
                .first()
                .map(|(desc, msg, _)| format!("{desc}: {msg}"))
                .unwrap_or_else(|| "request throttled".to_string());
            return Err(ReconcileError::Transient(format!(
                "change execution failed in zone {zone}: {detail}"
            )));
        }
    }
    Ok(executed)
}

/// Cleanup path for a deleted entry with no matching provider left.
async fn cleanup_without_provider(
    core: &CoreContext,
    input: &EntryPlanInput,
    set_name: &DnsSetName,
) -> Result<PlanOutcome, ReconcileError> {
    let Some((old_zone, old_name)) = old_location(&input.status) else {
        // Never written anywhere: nothing to clean up.
        return Ok(PlanOutcome {
            state: ResourceState::Deleting,
            message: "no records to clean up".to_string(),
            provider: None,
            provider_type: None,
            zone: None,
            dns_name: Some(set_name.dns_name.clone()),
            targets: None,
            ttl: None,
            routing_policy: None,
            records_present: false,
            executed: 0,
            lookup: None,
        });
    };

    let Some(account) = core.accounts.find_account_for_zone(&old_zone).await else {
        return Ok(PlanOutcome::stale(
            &input.status,
            format!("no account serves previous zone {old_zone}; records kept"),
        ));
    };

    let mut observed = Vec::new();
    collect_observed(&account, &old_zone, &old_name, &mut observed).await?;
    let changes = compute_changes(&old_zone, &old_name, &BTreeMap::new(), &observed);
    let mut zone_accounts = BTreeMap::new();
    zone_accounts.insert(old_zone.clone(), account);
    core.debounce.mark_updated(&input.entry_key);
    let executed = execute_changes(&old_zone, &changes, &zone_accounts).await?;

    Ok(PlanOutcome {
        state: ResourceState::Deleting,
        message: format!("cleaned up {executed} record set(s)"),
        provider: None,
        provider_type: None,
        zone: None,
        dns_name: Some(set_name.dns_name.clone()),
        targets: None,
        ttl: None,
        routing_policy: None,
        records_present: false,
        executed,
        lookup: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn finish(
    input: &EntryPlanInput,
    provider_state: &Arc<ProviderState>,
    matched: &SelectionMatch,
    dns_name: &str,
    targets: Vec<String>,
    ttl: i64,
    desired_empty: bool,
    executed: usize,
    lookup: Option<LookupUpdate>,
) -> PlanOutcome {
    if input.deleting || desired_empty {
        return PlanOutcome {
            state: ResourceState::Deleting,
            message: format!("cleaned up {executed} record set(s)"),
            provider: None,
            provider_type: None,
            zone: None,
            dns_name: Some(dns_name.to_string()),
            targets: None,
            ttl: None,
            routing_policy: None,
            records_present: false,
            executed,
            lookup: None,
        };
    }
    PlanOutcome {
        state: ResourceState::Ready,
        message: "desired records are in place".to_string(),
        provider: Some(provider_state.key.clone()),
        provider_type: Some(provider_state.provider_type.clone()),
        zone: Some(matched.zone.id.clone()),
        dns_name: Some(dns_name.to_string()),
        targets: Some(targets),
        ttl: Some(ttl),
        routing_policy: input.spec.routing_policy.clone(),
        records_present: true,
        executed,
        lookup,
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
