// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions for external DNS management.
//!
//! Three user-visible resources in group `dns.gardener.cloud`:
//!
//! - [`DNSProvider`] - credentials and zone scope of one external DNS
//!   backend (AWS Route53, Google Cloud DNS, the in-memory mock, ...)
//! - [`DNSEntry`] - one desired dns name with its targets or text values
//! - [`DNSAnnotation`] - attaches DNS-related annotations to another
//!   resource without editing that resource
//!
//! # Example: provider plus entry
//!
//! ```yaml
//! apiVersion: dns.gardener.cloud/v1alpha1
//! kind: DNSProvider
//! metadata:
//!   name: p1
//! spec:
//!   type: mock
//!   secretRef:
//!     name: mock-credentials
//!   domains:
//!     include:
//!       - example.com
//! ---
//! apiVersion: dns.gardener.cloud/v1alpha1
//! kind: DNSEntry
//! metadata:
//!   name: www
//! spec:
//!   dnsName: www.example.com
//!   targets:
//!     - 1.2.3.4
//!   ttl: 360
//! ```

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to the Secret carrying provider credentials.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the secret
    pub name: String,

    /// Namespace of the secret; defaults to the provider's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Include/exclude lists used for both domain and zone scoping.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Effective include/exclude sets reported in provider status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectionStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

/// Provider API request budget.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Sustained request budget, converted to queries per second
    pub requests_per_day: i64,

    /// Token bucket capacity
    pub burst: i64,
}

/// Routing policy declared on an entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingPolicySpec {
    /// Policy type (`weighted`, `geolocation`)
    pub r#type: String,

    /// Discriminator distinguishing variants sharing one dns name
    pub set_identifier: String,

    /// Policy parameters, e.g. `weight: "10"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// `DNSProvider` declares credentials and zone scope of one external DNS
/// backend.
///
/// The controller validates the referenced credentials, lists the hosted
/// zones of the account, applies the domain/zone include and exclude
/// filters, and publishes the result for entry assignment.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSProvider",
    namespaced,
    shortname = "dnspr",
    doc = "DNSProvider declares credentials and zone selection for one external DNS backend.",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DNSProviderStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderSpec {
    /// Provider type, matched against the handler registry (e.g. `mock`)
    pub r#type: String,

    /// Credential secret reference
    pub secret_ref: SecretReference,

    /// Opaque per-type configuration payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Value>,

    /// Domain include/exclude filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<Selection>,

    /// Zone id include/exclude filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<Selection>,

    /// Per-provider API request budget overriding the type default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    /// TTL applied to entries that do not set one themselves
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<i64>,
}

/// Status of a `DNSProvider`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSProviderStatus {
    /// `Ready`, `Error`, or `Invalid`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Human-readable detail of the last transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Effective domain selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<SelectionStatus>,

    /// Effective zone selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<SelectionStatus>,

    /// Effective default TTL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<i64>,

    /// Effective rate limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// RFC3339 timestamp of the last status change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

/// `DNSEntry` declares one desired dns name.
///
/// Exactly one of `targets` (address or hostname values) and `text` (TXT
/// values) must be set. The controller assigns the entry to the
/// best-matching provider and keeps the backend records in sync.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSEntry",
    namespaced,
    shortname = "dnse",
    doc = "DNSEntry declares a dns name with its desired targets or text values.",
    printcolumn = r#"{"name":"DNS","type":"string","jsonPath":".spec.dnsName"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Provider","type":"string","jsonPath":".status.provider"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "DNSEntryStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSEntrySpec {
    /// Desired dns name (wildcards allowed: `*.example.com`)
    pub dns_name: String,

    /// Target values: IPv4/IPv6 addresses or hostnames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,

    /// TXT values; mutually exclusive with `targets`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Vec<String>>,

    /// Record TTL in seconds; falls back to the provider default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Expand hostname targets to their A/AAAA addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_targets_to_addresses: Option<bool>,

    /// Seconds between re-expansions of hostname targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname_lookup_interval: Option<i64>,

    /// Routing policy variant declaration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicySpec>,
}

/// Status of a `DNSEntry`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSEntryStatus {
    /// `Ready`, `Invalid`, `Error`, `Stale`, `Ignored`, or `Deleting`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Assigned provider as `namespace/name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Provider type of the assigned provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,

    /// Hosted zone id holding the records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    /// Normalized dns name the records were written for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,

    /// Effective targets (after expansion and provider mapping)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,

    /// Effective TTL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Effective routing policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicySpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Reference to the object a `DNSAnnotation` decorates.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,

    /// Namespace of the referent; must equal the annotation's namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// `DNSAnnotation` attaches DNS annotations to a referenced resource
/// without editing that resource.
///
/// The annotation controller validates the reference and publishes the
/// merged annotations into an in-memory overlay consulted by the source
/// controllers.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "dns.gardener.cloud",
    version = "v1alpha1",
    kind = "DNSAnnotation",
    namespaced,
    shortname = "dnsa",
    doc = "DNSAnnotation attaches DNS-related annotations to a referenced resource.",
    printcolumn = r#"{"name":"RefKind","type":"string","jsonPath":".spec.resourceRef.kind"}"#,
    printcolumn = r#"{"name":"RefName","type":"string","jsonPath":".spec.resourceRef.name"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[kube(status = "DNSAnnotationStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSAnnotationSpec {
    /// The decorated object
    pub resource_ref: ResourceReference,

    /// Annotations to overlay on the referent
    pub annotations: BTreeMap<String, String>,
}

/// Status of a `DNSAnnotation`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSAnnotationStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// `namespace/name` key of a namespaced resource.
#[must_use]
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

impl DNSProvider {
    /// `namespace/name` key of this provider.
    #[must_use]
    pub fn provider_key(&self) -> String {
        object_key(&self.namespace().unwrap_or_default(), &self.name_any())
    }
}

impl DNSEntry {
    /// `namespace/name` key of this entry.
    #[must_use]
    pub fn entry_key(&self) -> String {
        object_key(&self.namespace().unwrap_or_default(), &self.name_any())
    }

    /// Set identifier from the routing policy, empty for plain entries.
    #[must_use]
    pub fn set_identifier(&self) -> String {
        self.spec
            .routing_policy
            .as_ref()
            .map(|p| p.set_identifier.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
