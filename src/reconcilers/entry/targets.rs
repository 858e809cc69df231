// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Target expansion.
//!
//! Hostname targets are expanded to their A/AAAA addresses when the entry
//! opts in (`resolveTargetsToAddresses`) or when it declares more than one
//! target including a hostname (several CNAME values for one name are not
//! representable). Address targets pass through untouched. Timeouts keep
//! the previous records; an all-NXDOMAIN expansion is a hard failure.

use crate::constants::{ANNOTATION_IP_STACK, TARGET_EXPANSION_PARALLELISM};
use crate::dns::{RecordType, Target};
use crate::errors::ReconcileError;
use crate::resolver::{lookup_all_hostnames, HostsLookupResult, Resolver};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Address family restriction from the `ip-stack` annotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpStack {
    Ipv4,
    Ipv6,
    DualStack,
}

impl IpStack {
    /// Parse the annotation; absence means no restriction.
    #[must_use]
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        match annotations.get(ANNOTATION_IP_STACK).map(String::as_str) {
            Some("ipv4") => IpStack::Ipv4,
            Some("ipv6") => IpStack::Ipv6,
            _ => IpStack::DualStack,
        }
    }

    fn admits(self, rtype: RecordType) -> bool {
        match self {
            IpStack::Ipv4 => rtype != RecordType::AAAA,
            IpStack::Ipv6 => rtype != RecordType::A,
            IpStack::DualStack => true,
        }
    }
}

/// Result of expanding an entry's targets.
#[derive(Clone, Debug, Default)]
pub struct ExpansionOutcome {
    /// Effective targets after expansion and family filtering
    pub targets: Vec<Target>,

    /// Hostnames that were expanded; non-empty means the lookup processor
    /// should keep re-resolving them
    pub hostnames: Vec<String>,

    /// Raw lookup result, handed to the lookup processor as the baseline
    pub lookup_result: Option<HostsLookupResult>,

    /// A timeout occurred: keep the previously written records
    pub deferred: bool,
}

/// Expand the raw target strings of one entry.
///
/// # Errors
///
/// Returns [`ReconcileError::Transient`] when every hostname resolves to
/// NXDOMAIN, leaving nothing to publish.
pub async fn expand_targets(
    resolver: Arc<dyn Resolver>,
    raw_targets: &[String],
    resolve_to_addresses: bool,
    ip_stack: IpStack,
) -> Result<ExpansionOutcome, ReconcileError> {
    let classified: Vec<Target> = raw_targets.iter().map(|t| Target::from_value(t)).collect();
    let hostnames: Vec<String> = classified
        .iter()
        .filter(|t| t.rtype == RecordType::CNAME)
        .map(|t| t.value.clone())
        .collect();

    let must_expand =
        !hostnames.is_empty() && (resolve_to_addresses || classified.len() > 1);

    if !must_expand {
        return Ok(ExpansionOutcome {
            targets: classified
                .into_iter()
                .filter(|t| t.rtype == RecordType::CNAME || ip_stack.admits(t.rtype))
                .collect(),
            hostnames: Vec::new(),
            lookup_result: None,
            deferred: false,
        });
    }

    let result =
        lookup_all_hostnames(resolver, &hostnames, TARGET_EXPANSION_PARALLELISM).await;

    if result.has_timeout() {
        debug!("target expansion hit a lookup timeout, keeping previous records");
        return Ok(ExpansionOutcome {
            targets: Vec::new(),
            hostnames,
            lookup_result: Some(result),
            deferred: true,
        });
    }
    if result.all_not_found() {
        return Err(ReconcileError::Transient(format!(
            "target lookup failed: no addresses found for {hostnames:?}"
        )));
    }

    let mut targets: Vec<Target> = classified
        .iter()
        .filter(|t| t.rtype != RecordType::CNAME && ip_stack.admits(t.rtype))
        .cloned()
        .collect();
    for ip in result.all_ips() {
        let target = match ip {
            IpAddr::V4(v4) => Target {
                rtype: RecordType::A,
                value: v4.to_string(),
            },
            IpAddr::V6(v6) => Target {
                rtype: RecordType::AAAA,
                value: v6.to_string(),
            },
        };
        if ip_stack.admits(target.rtype) {
            targets.push(target);
        }
    }
    targets.sort();
    targets.dedup();

    Ok(ExpansionOutcome {
        targets,
        hostnames,
        lookup_result: Some(result),
        deferred: false,
    })
}

#[cfg(test)]
#[path = "targets_tests.rs"]
mod targets_tests;
