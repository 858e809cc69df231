// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared harness for the end-to-end scenarios.
//!
//! Builds a [`CoreContext`] wired to in-memory mock providers and a
//! scripted resolver, and simulates the provider reconciler's registry
//! publication so the entry planning core can be driven without an API
//! server.

#![allow(dead_code)]

use async_trait::async_trait;
use extdns::account::authoritative::AuthoritativeResolver;
use extdns::account::{AccountConfig, AccountMap};
use extdns::config::ControllerManagerConfiguration;
use extdns::context::CoreContext;
use extdns::crd::{DNSEntrySpec, DNSEntryStatus, RoutingPolicySpec};
use extdns::dns::{name, DnsSetName, RecordSet, RecordType, ZoneId};
use extdns::errors::{ReconcileError, ResourceState};
use extdns::lookup::{LookupProcessor, ReconcileTrigger};
use extdns::provider::mock::{MockConfig, MockHandler, PROVIDER_TYPE_MOCK};
use extdns::provider::validation::{CredentialSchema, PropertySet, PropertySpec};
use extdns::provider::{DnsHandler, HandlerConfig, HandlerFactory, HandlerRegistry, ProviderError};
use extdns::reconcilers::entry::plan::{plan_and_execute, EntryPlanInput, PlanOutcome};
use extdns::reconcilers::provider::selection::compute_selection;
use extdns::registry::ProviderState;
use extdns::resolver::{LookupError, Resolver};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Mock factory that keeps handles to every handler it created.
struct RecordingMockFactory {
    created: Arc<Mutex<Vec<Arc<MockHandler>>>>,
}

impl HandlerFactory for RecordingMockFactory {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE_MOCK
    }

    fn credential_schema(&self) -> CredentialSchema {
        CredentialSchema::single(PropertySet::new(vec![PropertySpec::new("account")], vec![]))
    }

    fn create(&self, config: HandlerConfig) -> Result<Arc<dyn DnsHandler>, ProviderError> {
        let value = config.provider_config.ok_or_else(|| {
            ProviderError::InvalidConfig("mock provider requires a providerConfig".to_string())
        })?;
        let parsed: MockConfig = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
        let handler = Arc::new(MockHandler::new(parsed));
        self.created.lock().unwrap().push(handler.clone());
        Ok(handler)
    }
}

/// Authoritative resolver answering from the mock handlers' zone state,
/// the way real nameservers would answer from the provider's records.
struct MockAuthoritative {
    handlers: Arc<Mutex<Vec<Arc<MockHandler>>>>,
}

#[async_trait]
impl AuthoritativeResolver for MockAuthoritative {
    async fn query(
        &self,
        zone_domain: &str,
        dns_name: &str,
        rtype: RecordType,
    ) -> Result<Option<RecordSet>, LookupError> {
        let domain = name::normalize(zone_domain);
        let handlers = self.handlers.lock().unwrap().clone();
        for handler in handlers {
            for zone in handler.hosted_zones() {
                if zone.domain != domain {
                    continue;
                }
                let state = handler.zone_state(&zone.id);
                if let Some(set) = state.get(&DnsSetName::plain(dns_name)) {
                    if let Some(record_set) = set.sets.get(&rtype) {
                        return Ok(Some(record_set.clone()));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Scripted recursive resolver with swappable answers.
#[derive(Default)]
pub struct ScriptedResolver {
    answers: Mutex<BTreeMap<String, Result<Vec<IpAddr>, LookupError>>>,
}

impl ScriptedResolver {
    pub fn set(&self, hostname: &str, ips: &[&str]) {
        self.answers.lock().unwrap().insert(
            hostname.to_string(),
            Ok(ips.iter().map(|ip| ip.parse().unwrap()).collect()),
        );
    }

    pub fn set_error(&self, hostname: &str, error: LookupError) {
        self.answers
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Err(error));
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn lookup_ips(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
        self.answers
            .lock()
            .unwrap()
            .get(hostname)
            .cloned()
            .unwrap_or_else(|| Err(LookupError::NotFound(hostname.to_string())))
    }
}

struct NoopTrigger;

#[async_trait]
impl ReconcileTrigger for NoopTrigger {
    async fn trigger(&self, _entry_key: &str) {}
}

/// End-to-end harness: core context plus handles into the mock backends.
pub struct Harness {
    pub core: CoreContext,
    pub resolver: Arc<ScriptedResolver>,
    handlers: Arc<Mutex<Vec<Arc<MockHandler>>>>,
}

impl Harness {
    pub fn new() -> Self {
        let handlers = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(RecordingMockFactory {
            created: handlers.clone(),
        }));
        let accounts = Arc::new(AccountMap::new(
            registry.clone(),
            Arc::new(MockAuthoritative {
                handlers: handlers.clone(),
            }),
        ));
        let resolver = Arc::new(ScriptedResolver::default());
        let lookups = Arc::new(LookupProcessor::new(
            resolver.clone(),
            Arc::new(NoopTrigger),
            2,
        ));
        let config = Arc::new(ControllerManagerConfiguration::default());
        let core = CoreContext::new(accounts, registry, resolver.clone(), lookups, config);
        Self {
            core,
            resolver,
            handlers,
        }
    }

    /// Simulate one provider reconcile: account, zone listing, selection,
    /// registry publication.
    pub async fn add_provider(
        &self,
        key: &str,
        account_name: &str,
        zone_domains: &[&str],
        default_ttl: i64,
    ) {
        let mut properties = BTreeMap::new();
        properties.insert("account".to_string(), account_name.to_string());
        let mut account_config = AccountConfig::new(PROVIDER_TYPE_MOCK, properties);
        account_config.provider_config = Some(serde_json::json!({
            "name": account_name,
            "zones": zone_domains,
        }));
        let account = self.core.accounts.get(&account_config).unwrap();
        let zones = account.get_zones().await.unwrap();
        let selection = compute_selection(&zones, None, None);
        self.core.registry.put(ProviderState {
            key: key.to_string(),
            provider_type: PROVIDER_TYPE_MOCK.to_string(),
            state: ResourceState::Ready,
            account: Some(account),
            selection,
            default_ttl,
        });
    }

    /// Flip a published provider's state (e.g. to Error).
    pub fn set_provider_state(&self, key: &str, state: ResourceState) {
        let current = self.core.registry.get(key).expect("provider not published");
        self.core.registry.put(ProviderState {
            key: current.key.clone(),
            provider_type: current.provider_type.clone(),
            state,
            account: current.account.clone(),
            selection: current.selection.clone(),
            default_ttl: current.default_ttl,
        });
    }

    /// Handler backing the given mock account name.
    pub fn handler(&self, account_name: &str) -> Arc<MockHandler> {
        let prefix = format!("{account_name}:");
        self.handlers
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.hosted_zones().iter().any(|z| z.id.id.starts_with(&prefix)))
            .cloned()
            .expect("no handler for account")
    }

    pub fn zone(account_name: &str, domain: &str) -> ZoneId {
        ZoneId::new(PROVIDER_TYPE_MOCK, format!("{account_name}:{domain}"))
    }

    /// Run one planning pass the way the entry reconciler would.
    pub async fn reconcile(
        &self,
        entry_key: &str,
        spec: &DNSEntrySpec,
        status: Option<&DNSEntryStatus>,
        deleting: bool,
    ) -> Result<PlanOutcome, ReconcileError> {
        let input = EntryPlanInput {
            entry_key: entry_key.to_string(),
            spec: spec.clone(),
            status: status.cloned().unwrap_or_default(),
            annotations: BTreeMap::new(),
            deleting,
        };
        plan_and_execute(&self.core, &input).await
    }
}

/// Status a successful outcome would be persisted as.
pub fn status_of(outcome: &PlanOutcome) -> DNSEntryStatus {
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
        observed_generation: Some(1),
    }
}

/// Entry spec shorthand.
pub fn entry_spec(dns_name: &str, targets: &[&str], ttl: Option<i64>) -> DNSEntrySpec {
    DNSEntrySpec {
        dns_name: dns_name.to_string(),
        targets: Some(targets.iter().map(ToString::to_string).collect()),
        text: None,
        ttl,
        resolve_targets_to_addresses: None,
        cname_lookup_interval: None,
        routing_policy: None,
    }
}

/// Entry spec with TXT values.
pub fn text_spec(dns_name: &str, text: &[&str]) -> DNSEntrySpec {
    DNSEntrySpec {
        dns_name: dns_name.to_string(),
        targets: None,
        text: Some(text.iter().map(ToString::to_string).collect()),
        ttl: None,
        resolve_targets_to_addresses: None,
        cname_lookup_interval: None,
        routing_policy: None,
    }
}

/// Entry spec with a routing policy.
pub fn weighted_spec(
    dns_name: &str,
    targets: &[&str],
    set_identifier: &str,
    weight: &str,
) -> DNSEntrySpec {
    let mut parameters = BTreeMap::new();
    parameters.insert("weight".to_string(), weight.to_string());
    let mut spec = entry_spec(dns_name, targets, None);
    spec.routing_policy = Some(RoutingPolicySpec {
        r#type: "weighted".to_string(),
        set_identifier: set_identifier.to_string(),
        parameters,
    });
    spec
}
