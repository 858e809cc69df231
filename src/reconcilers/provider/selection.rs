// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone and domain selection for one provider.
//!
//! From the account's hosted zones and the provider spec's include/exclude
//! lists this module computes which zones the provider serves and which
//! domains each zone may claim. The longest-suffix rule decides conflicts
//! between includes and excludes: the more specific filter wins, and on a
//! tie the exclusion wins.

use crate::crd::Selection;
use crate::dns::name;
use crate::provider::HostedZone;
use crate::registry::{SelectedZone, SelectionResult};
use std::collections::BTreeSet;

/// Compute the effective selection for one provider.
///
/// Step A filters zones by id, step B computes per-zone domain candidates
/// (the zone's base domain, its forwarded subdomains, and any explicitly
/// included domain under the zone) and applies the domain filters.
/// Anomalies - an include that matched nothing, a zone whose every domain
/// was excluded - are collected as warnings rather than errors.
#[must_use]
pub fn compute_selection(
    zones: &[HostedZone],
    zone_filter: Option<&Selection>,
    domain_filter: Option<&Selection>,
) -> SelectionResult {
    let mut result = SelectionResult::default();

    let empty = Selection::default();
    let zone_filter = zone_filter.unwrap_or(&empty);
    let domain_filter = domain_filter.unwrap_or(&empty);

    let domain_includes: Vec<String> = domain_filter
        .include
        .iter()
        .map(|d| name::normalize(d))
        .collect();
    let domain_excludes: Vec<String> = domain_filter
        .exclude
        .iter()
        .map(|d| name::normalize(d))
        .collect();

    // Step A: zone id filters.
    let mut surviving: Vec<&HostedZone> = Vec::new();
    for zone in zones {
        let included = zone_filter.include.is_empty()
            || zone_filter.include.iter().any(|id| id == &zone.id.id);
        let excluded = zone_filter.exclude.iter().any(|id| id == &zone.id.id);
        if included && !excluded {
            surviving.push(zone);
        } else {
            result.excluded_zones.push(zone.id.clone());
        }
    }
    for wanted in &zone_filter.include {
        if !zones.iter().any(|z| &z.id.id == wanted) {
            result
                .warnings
                .push(format!("included zone {wanted:?} not found in account"));
        }
    }

    // Step B: per-zone domain candidates and filters.
    let mut included_union: BTreeSet<String> = BTreeSet::new();
    let mut excluded_union: BTreeSet<String> = BTreeSet::new();
    let mut matched_includes: BTreeSet<String> = BTreeSet::new();

    for zone in surviving {
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        candidates.insert(zone.domain.clone());
        for forwarded in &zone.forwarded_domains {
            candidates.insert(name::normalize(forwarded));
        }
        for include in &domain_includes {
            if name::matches_suffix(include, &zone.domain) {
                candidates.insert(include.clone());
            }
        }

        let mut kept: BTreeSet<String> = BTreeSet::new();
        for candidate in candidates {
            let include_len = if domain_includes.is_empty() {
                name::match_length(&candidate, &zone.domain).unwrap_or(0)
            } else {
                name::best_match(&candidate, &domain_includes)
                    .map(|(matched, len)| {
                        matched_includes.insert(matched.to_string());
                        len
                    })
                    .unwrap_or(0)
            };
            let exclude_len = name::best_match(&candidate, &domain_excludes)
                .map(|(_, len)| len)
                .unwrap_or(0);

            if include_len > 0 && include_len > exclude_len {
                kept.insert(candidate);
            } else {
                excluded_union.insert(candidate);
            }
        }

        // Excludes under this zone take part in name matching even though
        // they are not candidates themselves.
        for exclude in &domain_excludes {
            if name::matches_suffix(exclude, &zone.domain) {
                excluded_union.insert(exclude.clone());
            }
        }

        if kept.is_empty() {
            result.warnings.push(format!(
                "zone {} selected but all its domains are excluded",
                zone.id
            ));
            result.excluded_zones.push(zone.id.clone());
            continue;
        }

        included_union.extend(kept.iter().cloned());
        result.zones.push(SelectedZone {
            id: zone.id.clone(),
            domain: zone.domain.clone(),
            included_domains: kept.into_iter().collect(),
        });
    }

    for include in &domain_includes {
        if !matched_includes.contains(include)
            && !result
                .zones
                .iter()
                .any(|z| z.included_domains.contains(include))
        {
            result
                .warnings
                .push(format!("included domain {include:?} matched no zone"));
        }
    }

    result.included_domains = included_union.into_iter().collect();
    result.excluded_domains = excluded_union.into_iter().collect();
    result
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod selection_tests;
