// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider handler contract and factory registry.
//!
//! Every external DNS backend is driven through the same small surface:
//!
//! - [`DnsHandler`] - list hosted zones, read a zone's record state,
//!   execute a batch of change requests, and optionally project targets
//!   onto provider-specific forms.
//! - [`HandlerFactory`] - per-provider-type constructor that validates
//!   credentials and provider config before a handler is built.
//! - [`HandlerRegistry`] - maps provider type strings to factories.
//!
//! Validation failures are user errors (`Invalid`, not retried); handler
//! API failures are transient (`Error`, retried with back-off). Per-request
//! results of a batch are reported through [`DoneHandler`].

pub mod mock;
pub mod validation;

use crate::dns::{DnsSetName, DnsSets, RecordSet, RecordType, Target, ZoneId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use validation::CredentialSchema;

/// Errors surfaced by provider factories and handlers.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Credentials or provider config rejected by the adapter. User error.
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// No factory registered for the requested provider type.
    #[error("provider type {0:?} is not supported")]
    UnsupportedType(String),

    /// The requested zone is not (or no longer) served by this account.
    #[error("hosted zone {0} not found")]
    ZoneNotFound(ZoneId),

    /// The provider API rejected the call due to rate limiting.
    #[error("provider API request was throttled")]
    Throttled,

    /// Any other provider API failure. Transient.
    #[error("provider API error: {0}")]
    Api(String),
}

impl ProviderError {
    /// Whether this failure is a user error that must not be retried.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidConfig(_) | ProviderError::UnsupportedType(_)
        )
    }
}

/// One hosted zone as listed by a provider account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostedZone {
    pub id: ZoneId,
    /// Base domain of the zone, normalized
    pub domain: String,
    /// Private (split-horizon) zones are listed but flagged
    pub private: bool,
    /// Subdomains delegated away from this zone
    pub forwarded_domains: Vec<String>,
}

/// Kind of record-level change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        })
    }
}

/// One record-level change request for a `(set name, record type)` pair.
///
/// Updates carry both the observed (`old`) and the desired (`new`) set so
/// handlers whose APIs require delete-and-recreate can synthesize both
/// operations.
#[derive(Clone, Debug)]
pub struct ChangeRequest {
    pub action: ChangeAction,
    pub name: DnsSetName,
    pub rtype: RecordType,
    pub old: Option<RecordSet>,
    pub new: Option<RecordSet>,
}

impl ChangeRequest {
    #[must_use]
    pub fn create(name: DnsSetName, set: RecordSet) -> Self {
        Self {
            action: ChangeAction::Create,
            rtype: set.rtype,
            name,
            old: None,
            new: Some(set),
        }
    }

    #[must_use]
    pub fn update(name: DnsSetName, old: RecordSet, new: RecordSet) -> Self {
        Self {
            action: ChangeAction::Update,
            rtype: new.rtype,
            name,
            old: Some(old),
            new: Some(new),
        }
    }

    #[must_use]
    pub fn delete(name: DnsSetName, old: RecordSet) -> Self {
        Self {
            action: ChangeAction::Delete,
            rtype: old.rtype,
            name,
            old: Some(old),
            new: None,
        }
    }
}

/// Per-request completion callback for [`DnsHandler::execute_requests`].
pub trait DoneHandler: Send + Sync {
    fn succeeded(&self, request: &ChangeRequest);
    fn failed(&self, request: &ChangeRequest, error: &ProviderError);
    /// The request itself was malformed; retrying is pointless.
    fn invalid(&self, request: &ChangeRequest, error: &ProviderError);
    fn throttled(&self, request: &ChangeRequest);
}

/// [`DoneHandler`] that collects outcomes for inspection after a batch.
#[derive(Default)]
pub struct ChangeResultCollector {
    inner: Mutex<ChangeResults>,
}

/// Aggregated outcomes of one executed batch.
#[derive(Default, Clone, Debug)]
pub struct ChangeResults {
    pub succeeded: usize,
    pub throttled: usize,
    /// `(request description, error message, invalid?)` per failed request
    pub failures: Vec<(String, String, bool)>,
}

impl ChangeResults {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty() && self.throttled == 0
    }
}

impl ChangeResultCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn results(&self) -> ChangeResults {
        self.inner.lock().expect("collector poisoned").clone()
    }
}

impl DoneHandler for ChangeResultCollector {
    fn succeeded(&self, _request: &ChangeRequest) {
        self.inner.lock().expect("collector poisoned").succeeded += 1;
    }

    fn failed(&self, request: &ChangeRequest, error: &ProviderError) {
        self.inner.lock().expect("collector poisoned").failures.push((
            format!("{} {} {}", request.action, request.rtype, request.name),
            error.to_string(),
            false,
        ));
    }

    fn invalid(&self, request: &ChangeRequest, error: &ProviderError) {
        self.inner.lock().expect("collector poisoned").failures.push((
            format!("{} {} {}", request.action, request.rtype, request.name),
            error.to_string(),
            true,
        ));
    }

    fn throttled(&self, _request: &ChangeRequest) {
        self.inner.lock().expect("collector poisoned").throttled += 1;
    }
}

/// Uniform interface over heterogeneous provider APIs.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    /// Provider type this handler serves (matches its factory).
    fn provider_type(&self) -> &str;

    /// List the hosted zones visible to this account.
    async fn list_zones(&self) -> Result<Vec<HostedZone>, ProviderError>;

    /// Enumerate a zone's records in the internal representation.
    ///
    /// Provider-specific routing-policy encodings are normalized here:
    /// policy variants sharing a dns name come back as separate set names
    /// differing only in set identifier, and placeholder records (zero
    /// weight sentinels) are filtered out.
    async fn get_zone_state(&self, zone: &ZoneId) -> Result<DnsSets, ProviderError>;

    /// Apply a batch of change requests to one zone.
    ///
    /// Per-request outcomes are signalled through `done`; the returned
    /// error covers batch-level failures (connectivity, auth).
    async fn execute_requests(
        &self,
        zone: &ZoneId,
        requests: &[ChangeRequest],
        done: &dyn DoneHandler,
    ) -> Result<(), ProviderError>;

    /// Project logical targets onto provider-specific forms.
    ///
    /// The default is the identity. Providers with alias-style targets
    /// override this so that diffing compares the form the provider will
    /// actually return from [`Self::get_zone_state`].
    fn map_targets(&self, dns_name: &str, targets: Vec<Target>) -> Vec<Target> {
        let _ = dns_name;
        targets
    }
}

/// Everything a factory needs to build a handler.
#[derive(Clone)]
pub struct HandlerConfig {
    /// Decoded credential properties (secret data keys)
    pub properties: BTreeMap<String, String>,
    /// Decoded opaque per-type payload from `spec.providerConfig`
    pub provider_config: Option<serde_json::Value>,
}

/// Per-provider-type constructor and credential gatekeeper.
pub trait HandlerFactory: Send + Sync {
    /// Provider type string this factory serves.
    fn provider_type(&self) -> &str;

    /// Credential properties accepted by this provider type.
    fn credential_schema(&self) -> CredentialSchema;

    /// Whether a workload-identity token may be injected as a property.
    fn accepts_workload_identity(&self) -> bool {
        false
    }

    /// Validate the opaque provider config payload. Default accepts any.
    fn validate_provider_config(
        &self,
        config: Option<&serde_json::Value>,
    ) -> Result<(), ProviderError> {
        let _ = config;
        Ok(())
    }

    /// Pre-flight validation of credentials and provider config.
    ///
    /// Runs before a handler is instantiated; failures map to `Invalid`.
    fn validate(
        &self,
        properties: &BTreeMap<String, String>,
        config: Option<&serde_json::Value>,
    ) -> Result<(), ProviderError> {
        self.credential_schema()
            .validate(properties)
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
        self.validate_provider_config(config)
    }

    /// Build a handler for one validated credential set.
    fn create(&self, config: HandlerConfig) -> Result<Arc<dyn DnsHandler>, ProviderError>;
}

/// Registry mapping provider type strings to factories.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, Arc<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in provider types registered.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(mock::MockHandlerFactory::new()));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    #[must_use]
    pub fn supports(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Look up the factory for a provider type.
    pub fn get(&self, provider_type: &str) -> Result<Arc<dyn HandlerFactory>, ProviderError> {
        self.factories
            .get(provider_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedType(provider_type.to_string()))
    }

    /// Registered provider type strings, sorted.
    #[must_use]
    pub fn provider_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
