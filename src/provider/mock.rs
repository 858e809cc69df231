// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory mock provider.
//!
//! The mock provider keeps hosted zones and record sets in process memory.
//! It backs the integration tests and is handy against development
//! clusters where no real cloud account is available. Zone ids take the
//! form `<name>:<domain>` where `name` comes from the provider config, so
//! several mock providers can coexist without colliding.

use super::{
    ChangeAction, ChangeRequest, DnsHandler, DoneHandler, HandlerConfig, HandlerFactory,
    HostedZone, ProviderError,
};
use super::validation::{CredentialSchema, PropertySet, PropertySpec};
use crate::dns::{name, DnsSet, DnsSets, ZoneId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider type string of the mock provider.
pub const PROVIDER_TYPE_MOCK: &str = "mock";

/// Weighted-policy sentinel value treated as a placeholder record.
const PLACEHOLDER_VALUE: &str = "0.0.0.0";

/// Configuration payload of a mock provider (`spec.providerConfig`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockConfig {
    /// Account prefix used in zone ids (`<name>:<domain>`)
    pub name: String,
    /// Domains to expose as hosted zones
    #[serde(default)]
    pub zones: Vec<String>,
    /// Simulate a provider API failure when listing zones
    #[serde(default)]
    pub fail_get_zones: bool,
    /// Simulate a provider API failure when executing against this zone id
    #[serde(default)]
    pub fail_zone: Option<String>,
    /// Artificial latency per handler call
    #[serde(default)]
    pub latency_millis: Option<u64>,
}

/// Factory for [`MockHandler`].
#[derive(Default)]
pub struct MockHandlerFactory;

impl MockHandlerFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parse_config(config: Option<&serde_json::Value>) -> Result<MockConfig, ProviderError> {
        let Some(value) = config else {
            return Err(ProviderError::InvalidConfig(
                "mock provider requires a providerConfig".to_string(),
            ));
        };
        let parsed: MockConfig = serde_json::from_value(value.clone())
            .map_err(|e| ProviderError::InvalidConfig(format!("mock providerConfig: {e}")))?;
        if parsed.name.trim().is_empty() {
            return Err(ProviderError::InvalidConfig(
                "mock providerConfig: name must not be empty".to_string(),
            ));
        }
        for zone in &parsed.zones {
            if !name::is_valid(zone) {
                return Err(ProviderError::InvalidConfig(format!(
                    "mock providerConfig: invalid zone domain {zone:?}"
                )));
            }
        }
        Ok(parsed)
    }
}

impl HandlerFactory for MockHandlerFactory {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE_MOCK
    }

    fn credential_schema(&self) -> CredentialSchema {
        CredentialSchema::any_of(vec![
            PropertySet::new(vec![PropertySpec::new("account")], vec![]),
            PropertySet::new(
                vec![PropertySpec::new("workloadIdentityToken").sensitive()],
                vec![],
            ),
        ])
    }

    fn accepts_workload_identity(&self) -> bool {
        true
    }

    fn validate_provider_config(
        &self,
        config: Option<&serde_json::Value>,
    ) -> Result<(), ProviderError> {
        Self::parse_config(config).map(|_| ())
    }

    fn create(&self, config: HandlerConfig) -> Result<Arc<dyn DnsHandler>, ProviderError> {
        let parsed = Self::parse_config(config.provider_config.as_ref())?;
        Ok(Arc::new(MockHandler::new(parsed)))
    }
}

/// Handler keeping zones and record sets in memory.
pub struct MockHandler {
    config: MockConfig,
    zones: Vec<HostedZone>,
    state: Mutex<HashMap<ZoneId, DnsSets>>,
}

impl MockHandler {
    #[must_use]
    pub fn new(config: MockConfig) -> Self {
        let zones = config
            .zones
            .iter()
            .map(|domain| {
                let domain = name::normalize(domain);
                HostedZone {
                    id: ZoneId::new(PROVIDER_TYPE_MOCK, format!("{}:{domain}", config.name)),
                    domain,
                    private: false,
                    forwarded_domains: Vec::new(),
                }
            })
            .collect();
        Self {
            config,
            zones,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn known_zone(&self, zone: &ZoneId) -> Result<(), ProviderError> {
        if self.zones.iter().any(|z| &z.id == zone) {
            Ok(())
        } else {
            Err(ProviderError::ZoneNotFound(zone.clone()))
        }
    }

    async fn simulate_latency(&self) {
        if let Some(millis) = self.config.latency_millis {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    /// The hosted zones served by this handler.
    #[must_use]
    pub fn hosted_zones(&self) -> &[HostedZone] {
        &self.zones
    }

    /// Seed observed state directly. Test support.
    pub fn seed(&self, zone: &ZoneId, set: DnsSet) {
        let mut state = self.state.lock().expect("mock state poisoned");
        state
            .entry(zone.clone())
            .or_default()
            .insert(set.name.clone(), set);
    }

    /// Snapshot of one zone's record sets. Test support.
    #[must_use]
    pub fn zone_state(&self, zone: &ZoneId) -> DnsSets {
        self.state
            .lock()
            .expect("mock state poisoned")
            .get(zone)
            .cloned()
            .unwrap_or_default()
    }

    fn is_placeholder(set: &crate::dns::RecordSet) -> bool {
        set.routing_policy
            .as_ref()
            .is_some_and(|p| p.parameters.get("weight").map(String::as_str) == Some("0"))
            && set.records.iter().all(|r| r == PLACEHOLDER_VALUE)
    }
}

#[async_trait]
impl DnsHandler for MockHandler {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE_MOCK
    }

    async fn list_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        self.simulate_latency().await;
        if self.config.fail_get_zones {
            return Err(ProviderError::Api(
                "mock provider: zone listing failure injected".to_string(),
            ));
        }
        Ok(self.zones.clone())
    }

    async fn get_zone_state(&self, zone: &ZoneId) -> Result<DnsSets, ProviderError> {
        self.simulate_latency().await;
        self.known_zone(zone)?;
        let state = self.state.lock().expect("mock state poisoned");
        let mut sets = state.get(zone).cloned().unwrap_or_default();
        // Placeholder records never reach the diff.
        for dns_set in sets.values_mut() {
            dns_set.sets.retain(|_, rs| !Self::is_placeholder(rs));
        }
        sets.retain(|_, dns_set| !dns_set.is_empty());
        Ok(sets)
    }

    async fn execute_requests(
        &self,
        zone: &ZoneId,
        requests: &[ChangeRequest],
        done: &dyn DoneHandler,
    ) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        self.known_zone(zone)?;
        if self.config.fail_zone.as_deref() == Some(zone.id.as_str()) {
            return Err(ProviderError::Api(
                "mock provider: execution failure injected".to_string(),
            ));
        }

        let mut state = self.state.lock().expect("mock state poisoned");
        let zone_state = state.entry(zone.clone()).or_default();

        for request in requests {
            match request.action {
                ChangeAction::Create | ChangeAction::Update => {
                    let Some(new) = request.new.clone() else {
                        done.invalid(
                            request,
                            &ProviderError::Api(format!(
                                "{} request without a record set",
                                request.action
                            )),
                        );
                        continue;
                    };
                    zone_state
                        .entry(request.name.clone())
                        .or_insert_with(|| DnsSet::new(request.name.clone()))
                        .insert(new);
                    done.succeeded(request);
                }
                ChangeAction::Delete => {
                    if let Some(dns_set) = zone_state.get_mut(&request.name) {
                        dns_set.sets.remove(&request.rtype);
                        if dns_set.is_empty() {
                            zone_state.remove(&request.name);
                        }
                    }
                    done.succeeded(request);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod mock_tests;
