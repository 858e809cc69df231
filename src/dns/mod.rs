// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Internal DNS data model.
//!
//! This module defines the representation shared by the entry reconciler,
//! the account layer, and the provider handlers:
//!
//! - [`RecordType`] - the record types the controller manages
//! - [`RecordSet`] - one type's records for one name, with TTL and policy
//! - [`DnsSetName`] - a dns name plus the routing-policy set identifier
//! - [`DnsSet`] / [`DnsSets`] - records grouped per name
//! - [`ZoneId`] - globally unique hosted-zone identifier
//! - [`Target`] - one desired target value with its inferred record type
//!
//! Equality between desired and observed record sets is deliberately not
//! derived: [`RecordSet::matches`] implements the comparison the diff
//! relies on (order-insensitive records, case-insensitive dns-name values,
//! exact TXT strings, numeric TTL).

pub mod name;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// DNS record types managed by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    NS,
}

impl RecordType {
    /// Whether record values of this type are dns names (compared
    /// case-insensitively) rather than literals.
    #[must_use]
    pub fn values_are_names(&self) -> bool {
        matches!(self, RecordType::CNAME | RecordType::NS)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::TXT => "TXT",
            RecordType::NS => "NS",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "TXT" => Ok(RecordType::TXT),
            "NS" => Ok(RecordType::NS),
            other => Err(format!("unsupported record type: {other}")),
        }
    }
}

/// Globally unique identifier of one hosted zone.
///
/// The provider-native id alone is not unique across provider types, so the
/// type travels with it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId {
    /// Provider type owning the zone (e.g. `mock`, `aws-route53`)
    pub provider_type: String,
    /// Provider-native zone identifier
    pub id: String,
}

impl ZoneId {
    #[must_use]
    pub fn new(provider_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_type, self.id)
    }
}

/// A dns name together with the routing-policy set identifier.
///
/// Records with the same name but different set identifiers are distinct
/// routing-policy variants and are planned independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DnsSetName {
    /// Normalized dns name
    pub dns_name: String,
    /// Routing-policy discriminator; empty for plain entries
    pub set_identifier: String,
}

impl DnsSetName {
    /// Build a set name, normalizing the dns name.
    #[must_use]
    pub fn new(dns_name: &str, set_identifier: &str) -> Self {
        Self {
            dns_name: name::normalize(dns_name),
            set_identifier: set_identifier.to_string(),
        }
    }

    /// Build a plain set name without a set identifier.
    #[must_use]
    pub fn plain(dns_name: &str) -> Self {
        Self::new(dns_name, "")
    }
}

impl std::fmt::Display for DnsSetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.set_identifier.is_empty() {
            f.write_str(&self.dns_name)
        } else {
            write!(f, "{}#{}", self.dns_name, self.set_identifier)
        }
    }
}

/// Routing policy attached to a record set (weighted, geolocation, ...).
///
/// Policies compare by type and parameter map; the set identifier lives on
/// the owning [`DnsSetName`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Policy type (`weighted`, `geolocation`)
    pub typ: String,
    /// Policy parameters (e.g. `weight: "10"`, `location: "eu-west-1"`)
    pub parameters: BTreeMap<String, String>,
}

impl RoutingPolicy {
    #[must_use]
    pub fn new(typ: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        Self {
            typ: typ.into(),
            parameters,
        }
    }
}

/// One record type's value set for one dns set name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Record type of all values in this set
    pub rtype: RecordType,
    /// Time to live in seconds
    pub ttl: i64,
    /// Record values (IP addresses, hostnames, quoted text)
    pub records: Vec<String>,
    /// Optional routing policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_policy: Option<RoutingPolicy>,
}

impl RecordSet {
    #[must_use]
    pub fn new(rtype: RecordType, ttl: i64, records: Vec<String>) -> Self {
        Self {
            rtype,
            ttl,
            records,
            routing_policy: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Option<RoutingPolicy>) -> Self {
        self.routing_policy = policy;
        self
    }

    /// Compare desired against observed.
    ///
    /// Records compare as multisets: order-insensitive, case-insensitive
    /// for dns-name values (CNAME, NS), exact strings for everything else.
    /// TTL compares numerically and routing policies by type, parameters,
    /// and (via the owning set name) set identifier.
    #[must_use]
    pub fn matches(&self, other: &RecordSet) -> bool {
        if self.rtype != other.rtype || self.ttl != other.ttl {
            return false;
        }
        if self.routing_policy != other.routing_policy {
            return false;
        }
        if self.records.len() != other.records.len() {
            return false;
        }
        let canon = |rs: &RecordSet| -> BTreeMap<String, usize> {
            let mut counts = BTreeMap::new();
            for r in &rs.records {
                let key = if rs.rtype.values_are_names() {
                    name::normalize(r)
                } else {
                    r.clone()
                };
                *counts.entry(key).or_insert(0) += 1;
            }
            counts
        };
        canon(self) == canon(other)
    }
}

/// All record sets for one dns set name, keyed by record type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsSet {
    pub name: DnsSetName,
    pub sets: BTreeMap<RecordType, RecordSet>,
}

impl DnsSet {
    #[must_use]
    pub fn new(name: DnsSetName) -> Self {
        Self {
            name,
            sets: BTreeMap::new(),
        }
    }

    /// Insert a record set, replacing any existing set of the same type.
    pub fn insert(&mut self, set: RecordSet) {
        self.sets.insert(set.rtype, set);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Record sets of a whole zone (or a queried slice of one), keyed by set name.
pub type DnsSets = BTreeMap<DnsSetName, DnsSet>;

/// One desired target value with the record type inferred from its shape.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    pub rtype: RecordType,
    pub value: String,
}

impl Target {
    /// Classify a target string: IPv4 literal, IPv6 literal, or hostname.
    #[must_use]
    pub fn from_value(value: &str) -> Self {
        match value.trim().parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => Self {
                rtype: RecordType::A,
                value: v4.to_string(),
            },
            Ok(IpAddr::V6(v6)) => Self {
                rtype: RecordType::AAAA,
                value: v6.to_string(),
            },
            Err(_) => Self {
                rtype: RecordType::CNAME,
                value: name::normalize(value),
            },
        }
    }

    #[must_use]
    pub fn hostname(value: &str) -> Self {
        Self {
            rtype: RecordType::CNAME,
            value: name::normalize(value),
        }
    }
}

/// Group targets by record type into record sets at a common TTL.
///
/// Duplicate values within one type are dropped; the result is sorted for
/// stable diffing and status output.
#[must_use]
pub fn record_sets_from_targets(targets: &[Target], ttl: i64) -> BTreeMap<RecordType, RecordSet> {
    let mut grouped: BTreeMap<RecordType, BTreeSet<String>> = BTreeMap::new();
    for target in targets {
        grouped
            .entry(target.rtype)
            .or_default()
            .insert(target.value.clone());
    }
    grouped
        .into_iter()
        .map(|(rtype, values)| {
            (
                rtype,
                RecordSet::new(rtype, ttl, values.into_iter().collect()),
            )
        })
        .collect()
}

/// Normalize a TXT value to its quoted wire form.
///
/// Values arriving already quoted are kept as-is; everything else is
/// wrapped so that diffing compares the same representation the providers
/// return.
#[must_use]
pub fn ensure_quoted_text(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}
