// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared registry of provider states.
//!
//! The provider reconciler publishes one [`ProviderState`] per DNSProvider
//! after each reconcile; the entry reconciler reads the whole registry on
//! every pass to pick the best-matching provider for a dns name. The
//! registry is the only coupling between the two reconcilers - entries
//! never read DNSProvider resources directly.

use crate::account::Account;
use crate::dns::{name, ZoneId};
use crate::errors::ResourceState;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One hosted zone surviving selection, with the domains it may serve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedZone {
    pub id: ZoneId,
    /// Base domain of the zone
    pub domain: String,
    /// Domains of this zone included by the selection (base domain and,
    /// where applicable, explicitly included subdomains)
    pub included_domains: Vec<String>,
}

/// Effective zone and domain selection of one provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionResult {
    /// Zones surviving the zone filters
    pub zones: Vec<SelectedZone>,
    /// Zone ids removed by the zone filters
    pub excluded_zones: Vec<ZoneId>,
    /// All included domains, flattened for status reporting
    pub included_domains: Vec<String>,
    /// Domains removed by the exclude filters
    pub excluded_domains: Vec<String>,
    /// Selection anomalies surfaced as Warning events
    pub warnings: Vec<String>,
}

/// One match of a dns name against a selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionMatch {
    pub zone: ZoneId,
    /// Base domain of the matched zone
    pub zone_domain: String,
    /// The included domain that matched
    pub matched_domain: String,
    /// Length of the matched suffix (specificity)
    pub match_length: usize,
}

impl SelectionResult {
    /// Match a dns name against this selection.
    ///
    /// A domain is usable when it has an included suffix match and no
    /// excluded suffix at least as specific. Among usable zones the one
    /// with the most specific included domain wins.
    #[must_use]
    pub fn match_for(&self, dns_name: &str) -> Option<SelectionMatch> {
        let excluded_len = name::best_match(dns_name, &self.excluded_domains)
            .map(|(_, len)| len)
            .unwrap_or(0);

        let mut best: Option<SelectionMatch> = None;
        for zone in &self.zones {
            let Some((domain, len)) = name::best_match(dns_name, &zone.included_domains) else {
                continue;
            };
            if excluded_len >= len {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    len > current.match_length
                        || (len == current.match_length
                            && zone.domain.len() > current.zone_domain.len())
                }
            };
            if better {
                best = Some(SelectionMatch {
                    zone: zone.id.clone(),
                    zone_domain: zone.domain.clone(),
                    matched_domain: domain.to_string(),
                    match_length: len,
                });
            }
        }
        best
    }
}

/// Published state of one reconciled provider.
pub struct ProviderState {
    /// `namespace/name` key of the provider
    pub key: String,
    pub provider_type: String,
    /// `Ready`, `Error`, or `Invalid`
    pub state: ResourceState,
    /// Account backing this provider; absent while credentials are invalid
    pub account: Option<Arc<Account>>,
    pub selection: SelectionResult,
    /// Effective default TTL for entries without an own TTL
    pub default_ttl: i64,
}

impl ProviderState {
    /// Whether entries may be assigned work against this provider.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ResourceState::Ready && self.account.is_some()
    }
}

/// Process-wide map from provider key to its latest state.
///
/// Rebuilt per provider on every provider reconcile; the view is
/// monotonically updated, never partially.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    states: Arc<RwLock<HashMap<String, Arc<ProviderState>>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state published for one provider.
    pub fn put(&self, state: ProviderState) {
        let mut states = self.states.write().expect("provider registry poisoned");
        states.insert(state.key.clone(), Arc::new(state));
    }

    /// Remove a provider (on deletion). Returns the removed state.
    pub fn remove(&self, key: &str) -> Option<Arc<ProviderState>> {
        self.states
            .write()
            .expect("provider registry poisoned")
            .remove(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<ProviderState>> {
        self.states
            .read()
            .expect("provider registry poisoned")
            .get(key)
            .cloned()
    }

    /// Snapshot of all provider states, sorted by key for stable
    /// tie-breaking.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ProviderState>> {
        let mut states: Vec<Arc<ProviderState>> = self
            .states
            .read()
            .expect("provider registry poisoned")
            .values()
            .cloned()
            .collect();
        states.sort_by(|a, b| a.key.cmp(&b.key));
        states
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states
            .read()
            .expect("provider registry poisoned")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
