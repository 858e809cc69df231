// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller-manager configuration.
//!
//! A single YAML document, parsed once at startup. Every knob has a
//! default so an empty document yields a working configuration; the
//! defaults match the documented behavior of the controllers (sync
//! periods, concurrency, rate limits, server ports).

use crate::constants::{
    DEFAULT_ANNOTATION_CONCURRENT_SYNCS, DEFAULT_CLASS, DEFAULT_CNAME_LOOKUP_INTERVAL_SECS,
    DEFAULT_ENTRY_CONCURRENT_SYNCS, DEFAULT_LEASE_DURATION_SECS,
    DEFAULT_LEASE_RENEW_DEADLINE_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS,
    DEFAULT_MAX_CONCURRENT_LOOKUPS, DEFAULT_PROVIDER_CONCURRENT_SYNCS, DEFAULT_RATE_LIMIT_BURST,
    DEFAULT_RATE_LIMIT_QPS, DEFAULT_RECHECK_PERIOD_SECS, DEFAULT_RECONCILIATION_DELAY_SECS,
    DEFAULT_RECONCILIATION_TIMEOUT_SECS, DEFAULT_SYNC_PERIOD_SECS, DEFAULT_TTL_SECS,
    DEFAULT_ZONE_CACHE_TTL_SECS, HEALTH_SERVER_PORT, METRICS_SERVER_PORT,
};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Marker value selecting the in-cluster kubeconfig.
pub const IN_CLUSTER: &str = "IN-CLUSTER";

/// Top-level configuration document.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerManagerConfiguration {
    /// Controller responsibility scope; resources of other classes are
    /// ignored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    pub client_connection: ClientConnection,

    /// Client for the cluster holding DNSProviders, when separate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_client_connection: Option<ClientConnection>,

    pub leader_election: LeaderElection,

    pub server: ServerConfiguration,

    pub controllers: Controllers,

    /// Per-provider-type overrides keyed by type string
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_advanced_options: BTreeMap<String, ProviderAdvancedOptions>,

    pub deploy_crds: bool,

    pub conditional_deploy_crds: bool,

    pub add_shoot_no_cleanup_label_to_crds: bool,
}

impl ControllerManagerConfiguration {
    /// Load and parse the YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        Self::parse(&raw)
    }

    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not valid YAML or does not
    /// match the configuration schema.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("parsing configuration document")
    }

    /// Effective controller class.
    #[must_use]
    pub fn class(&self) -> &str {
        self.class.as_deref().unwrap_or(DEFAULT_CLASS)
    }

    /// Advanced options for one provider type, defaults when absent.
    #[must_use]
    pub fn advanced_options(&self, provider_type: &str) -> ProviderAdvancedOptions {
        self.provider_advanced_options
            .get(provider_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Kubernetes API client tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConnection {
    /// Path to a kubeconfig, or `IN-CLUSTER`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,

    pub qps: f32,

    pub burst: u32,

    /// Informer resync period in seconds
    pub cache_resync_period: u64,
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            qps: 20.0,
            burst: 40,
            cache_resync_period: DEFAULT_SYNC_PERIOD_SECS,
        }
    }
}

impl ClientConnection {
    /// Whether this connection should use the in-cluster config.
    #[must_use]
    pub fn is_in_cluster(&self) -> bool {
        self.kubeconfig.as_deref() == Some(IN_CLUSTER)
    }
}

/// Lease-based leader election settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderElection {
    pub leader_elect: bool,

    pub resource_lock: String,

    pub resource_name: String,

    pub resource_namespace: String,

    /// Lease duration in seconds
    pub lease_duration: u64,

    /// Renew deadline in seconds
    pub renew_deadline: u64,

    /// Retry period in seconds
    pub retry_period: u64,
}

impl Default for LeaderElection {
    fn default() -> Self {
        Self {
            leader_elect: true,
            resource_lock: "leases".to_string(),
            resource_name: "extdns-controller-manager".to_string(),
            resource_namespace: "kube-system".to_string(),
            lease_duration: DEFAULT_LEASE_DURATION_SECS,
            renew_deadline: DEFAULT_LEASE_RENEW_DEADLINE_SECS,
            retry_period: DEFAULT_LEASE_RETRY_PERIOD_SECS,
        }
    }
}

/// One HTTP endpoint binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoint {
    pub bind_address: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 0,
        }
    }
}

/// Observability endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfiguration {
    pub health_probes: Endpoint,
    pub metrics: Endpoint,
    pub webhooks: Endpoint,
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            health_probes: Endpoint {
                bind_address: "0.0.0.0".to_string(),
                port: HEALTH_SERVER_PORT,
            },
            metrics: Endpoint {
                bind_address: "0.0.0.0".to_string(),
                port: METRICS_SERVER_PORT,
            },
            webhooks: Endpoint::default(),
        }
    }
}

/// Per-controller settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Controllers {
    pub dns_provider: DnsProviderControllerConfig,
    pub dns_entry: DnsEntryControllerConfig,
    pub source: SourceControllerConfig,
}

/// DNSProvider controller settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsProviderControllerConfig {
    pub concurrent_syncs: usize,

    /// Full resync period in seconds
    pub sync_period: u64,

    /// Recheck period in seconds when an account lists no zones
    pub recheck_period: u64,

    /// Per-reconcile deadline in seconds
    pub reconciliation_timeout: u64,

    /// Restrict watched providers to one namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Provider types this instance handles; empty means all registered
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_provider_types: Vec<String>,

    /// Provider types removed from the enabled set
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disabled_provider_types: Vec<String>,

    pub default_rate_limits: RateLimitDefaults,

    pub default_ttl: i64,

    /// Zone list cache TTL in seconds
    pub zone_cache_ttl: u64,

    /// Suppress the secret finalizer so a legacy controller can share
    /// secrets
    pub migration_mode: bool,
}

impl Default for DnsProviderControllerConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: DEFAULT_PROVIDER_CONCURRENT_SYNCS,
            sync_period: DEFAULT_SYNC_PERIOD_SECS,
            recheck_period: DEFAULT_RECHECK_PERIOD_SECS,
            reconciliation_timeout: DEFAULT_RECONCILIATION_TIMEOUT_SECS,
            namespace: None,
            enabled_provider_types: Vec::new(),
            disabled_provider_types: Vec::new(),
            default_rate_limits: RateLimitDefaults::default(),
            default_ttl: DEFAULT_TTL_SECS,
            zone_cache_ttl: DEFAULT_ZONE_CACHE_TTL_SECS,
            migration_mode: false,
        }
    }
}

impl DnsProviderControllerConfig {
    /// Whether `provider_type` is handled by this controller instance.
    #[must_use]
    pub fn provider_type_enabled(&self, provider_type: &str) -> bool {
        let enabled = self.enabled_provider_types.is_empty()
            || self
                .enabled_provider_types
                .iter()
                .any(|t| t == provider_type);
        let disabled = self
            .disabled_provider_types
            .iter()
            .any(|t| t == provider_type);
        enabled && !disabled
    }
}

/// Default provider API rate limits.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitDefaults {
    pub enabled: bool,
    pub qps: f64,
    pub burst: u32,
}

impl Default for RateLimitDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            qps: DEFAULT_RATE_LIMIT_QPS,
            burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

/// DNSEntry controller settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsEntryControllerConfig {
    pub concurrent_syncs: usize,

    /// Per-reconcile deadline in seconds
    pub reconciliation_timeout: u64,

    pub max_concurrent_lookups: usize,

    /// Default CNAME re-expansion interval in seconds
    pub default_cname_lookup_interval: u64,

    /// Debounce window after an update, in seconds
    pub reconciliation_delay_after_update: u64,
}

impl Default for DnsEntryControllerConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: DEFAULT_ENTRY_CONCURRENT_SYNCS,
            reconciliation_timeout: DEFAULT_RECONCILIATION_TIMEOUT_SECS,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
            default_cname_lookup_interval: DEFAULT_CNAME_LOOKUP_INTERVAL_SECS,
            reconciliation_delay_after_update: DEFAULT_RECONCILIATION_DELAY_SECS,
        }
    }
}

/// Source controller settings (Service/Ingress/Gateway derivation).
///
/// The source controllers live outside this crate; their configuration is
/// parsed here so one document configures the whole deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceControllerConfig {
    pub concurrent_syncs: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name_prefix: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub target_labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_cluster_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_cluster_id: Option<String>,

    pub dns_provider_replication: bool,
}

impl Default for SourceControllerConfig {
    fn default() -> Self {
        Self {
            concurrent_syncs: DEFAULT_ANNOTATION_CONCURRENT_SYNCS,
            source_class: None,
            target_class: None,
            target_namespace: None,
            target_name_prefix: None,
            target_labels: BTreeMap::new(),
            target_cluster_id: None,
            source_cluster_id: None,
            dns_provider_replication: false,
        }
    }
}

/// Per-provider-type overrides.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderAdvancedOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<RateLimitDefaults>,

    /// Change requests submitted per execution batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Retries for throttled change requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<usize>,

    /// Zone ids never surfaced for this provider type
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_zones: Vec<String>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
