// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for all controllers.
//!
//! Controllers receive an `Arc<Context>` carrying the Kubernetes client,
//! reflector stores for the CRD types, and the [`CoreContext`] with all
//! cluster-independent machinery (provider registry, account map, name
//! locks, caches). The split keeps the planning core testable without an
//! API server.

use crate::account::AccountMap;
use crate::config::ControllerManagerConfiguration;
use crate::crd::{DNSAnnotation, DNSEntry, DNSProvider};
use crate::debounce::DebounceCache;
use crate::events::EventPublisher;
use crate::locks::NameLocks;
use crate::lookup::LookupProcessor;
use crate::provider::HandlerRegistry;
use crate::registry::ProviderRegistry;
use crate::resolver::Resolver;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Cluster-independent state shared by the reconcilers.
///
/// Everything in here can be constructed in tests without a Kubernetes
/// client.
pub struct CoreContext {
    /// Latest published state per provider
    pub registry: ProviderRegistry,

    /// Live accounts keyed by credential hash
    pub accounts: Arc<AccountMap>,

    /// Registered provider types
    pub handlers: HandlerRegistry,

    /// All-or-nothing dns name locks
    pub locks: NameLocks,

    /// Post-update debounce stamps
    pub debounce: DebounceCache,

    /// Recursive resolver for target expansion
    pub resolver: Arc<dyn Resolver>,

    /// Background CNAME lookup scheduler
    pub lookups: Arc<LookupProcessor>,

    /// Parsed configuration document
    pub config: Arc<ControllerManagerConfiguration>,
}

impl CoreContext {
    #[must_use]
    pub fn new(
        accounts: Arc<AccountMap>,
        handlers: HandlerRegistry,
        resolver: Arc<dyn Resolver>,
        lookups: Arc<LookupProcessor>,
        config: Arc<ControllerManagerConfiguration>,
    ) -> Self {
        let debounce_window = Duration::from_secs(
            config
                .controllers
                .dns_entry
                .reconciliation_delay_after_update,
        );
        Self {
            registry: ProviderRegistry::new(),
            accounts,
            handlers,
            locks: NameLocks::new(),
            debounce: DebounceCache::new(debounce_window),
            resolver,
            lookups,
            config,
        }
    }
}

/// Reflector stores for the CRD types.
///
/// Populated by dedicated reflector tasks; lookups never hit the API
/// server.
#[derive(Clone)]
pub struct Stores {
    pub providers: Store<DNSProvider>,
    pub entries: Store<DNSEntry>,
    pub annotations: Store<DNSAnnotation>,
}

impl Stores {
    /// Entries currently assigned to the given provider key.
    ///
    /// Consulted during provider deletion: the provider must not go away
    /// while entries still reference it in status.
    #[must_use]
    pub fn entries_for_provider(&self, provider_key: &str) -> Vec<Arc<DNSEntry>> {
        self.entries
            .state()
            .iter()
            .filter(|entry| {
                entry
                    .status
                    .as_ref()
                    .and_then(|s| s.provider.as_deref())
                    .is_some_and(|p| p == provider_key)
            })
            .cloned()
            .collect()
    }

    /// A provider by `namespace/name` key.
    #[must_use]
    pub fn get_provider(&self, key: &str) -> Option<Arc<DNSProvider>> {
        self.providers
            .state()
            .iter()
            .find(|p| p.provider_key() == key)
            .cloned()
    }
}

/// In-memory overlay of annotations published by DNSAnnotation resources.
///
/// Keyed `apiVersion/Kind/namespace/name`. Source controllers consult the
/// overlay when deriving entries from Services, Ingresses, and Gateways.
#[derive(Clone, Default)]
pub struct AnnotationOverlay {
    entries: Arc<RwLock<BTreeMap<String, BTreeMap<String, String>>>>,
}

impl AnnotationOverlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a referenced object.
    #[must_use]
    pub fn overlay_key(api_version: &str, kind: &str, namespace: &str, name: &str) -> String {
        format!("{api_version}/{kind}/{namespace}/{name}")
    }

    /// Replace the annotations published for one referent.
    pub fn put(&self, key: &str, annotations: BTreeMap<String, String>) {
        self.entries
            .write()
            .expect("annotation overlay poisoned")
            .insert(key.to_string(), annotations);
    }

    /// Remove a referent's overlay.
    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .expect("annotation overlay poisoned")
            .remove(key);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<BTreeMap<String, String>> {
        self.entries
            .read()
            .expect("annotation overlay poisoned")
            .get(key)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("annotation overlay poisoned")
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared context passed to all controllers.
pub struct Context {
    /// Client for the cluster holding entries and secrets
    pub client: Client,

    /// Client for the cluster holding providers (may equal `client`)
    pub control_plane_client: Client,

    pub stores: Stores,

    pub core: CoreContext,

    pub events: EventPublisher,

    pub overlay: AnnotationOverlay,
}

impl Context {
    /// Class annotation check: whether this controller is responsible for
    /// the given resource.
    #[must_use]
    pub fn is_responsible<T: ResourceExt>(&self, resource: &T) -> bool {
        let class = resource
            .annotations()
            .get(crate::constants::ANNOTATION_CLASS)
            .map(String::as_str)
            .unwrap_or(crate::constants::DEFAULT_CLASS);
        class == self.core.config.class()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
