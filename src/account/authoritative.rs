// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Authoritative nameserver queries.
//!
//! Observed record state for plain entries is read from the zone's own
//! nameservers instead of the provider API; the provider read quota is the
//! scarce resource, recursive DNS is not. The nameserver set of a zone is
//! discovered through the system resolver, then each candidate is queried
//! directly over UDP until one answers authoritatively.

use crate::dns::{ensure_quoted_text, name, RecordSet, RecordType};
use crate::resolver::LookupError;
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::rr::{DNSClass, Name, RData};
use hickory_client::udp::UdpClientConnection;
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use tracing::debug;

/// Queries one `(zone, dns name, record type)` against the zone's
/// authoritative nameservers.
///
/// `Ok(None)` means an authoritative "no such record" answer; errors are
/// classified like recursive lookups.
#[async_trait]
pub trait AuthoritativeResolver: Send + Sync {
    async fn query(
        &self,
        zone_domain: &str,
        dns_name: &str,
        rtype: RecordType,
    ) -> Result<Option<RecordSet>, LookupError>;
}

/// [`AuthoritativeResolver`] using the system resolver for NS discovery
/// and direct UDP queries for the records themselves.
pub struct NameserverResolver {
    resolver: TokioAsyncResolver,
}

impl NameserverResolver {
    /// Build from the system resolver configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when `/etc/resolv.conf` cannot be read.
    pub fn from_system_conf() -> Result<Self, LookupError> {
        let resolver =
            TokioAsyncResolver::tokio_from_system_conf().map_err(LookupError::from)?;
        Ok(Self { resolver })
    }

    /// Addresses of the zone's authoritative nameservers.
    async fn nameserver_addrs(&self, zone_domain: &str) -> Result<Vec<IpAddr>, LookupError> {
        let ns = self
            .resolver
            .ns_lookup(name::fqdn(zone_domain))
            .await
            .map_err(LookupError::from)?;

        let mut addrs = Vec::new();
        for record in ns.iter() {
            let host = record.0.to_utf8();
            match self.resolver.lookup_ip(host.as_str()).await {
                Ok(ips) => addrs.extend(ips.iter()),
                Err(e) => {
                    debug!(nameserver = %host, error = %e, "failed to resolve nameserver address");
                }
            }
        }
        if addrs.is_empty() {
            return Err(LookupError::Other(format!(
                "no reachable nameserver for zone {zone_domain}"
            )));
        }
        Ok(addrs)
    }
}

#[async_trait]
impl AuthoritativeResolver for NameserverResolver {
    async fn query(
        &self,
        zone_domain: &str,
        dns_name: &str,
        rtype: RecordType,
    ) -> Result<Option<RecordSet>, LookupError> {
        let addrs = self.nameserver_addrs(zone_domain).await?;

        let mut last_err: Option<LookupError> = None;
        for addr in addrs {
            match query_nameserver(addr, dns_name, rtype).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    debug!(nameserver = %addr, dns_name = dns_name, error = %e,
                        "authoritative query failed, trying next nameserver");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| LookupError::Other("no nameserver answered".to_string())))
    }
}

/// Query one nameserver over UDP and map the answer into a [`RecordSet`].
async fn query_nameserver(
    server: IpAddr,
    dns_name: &str,
    rtype: RecordType,
) -> Result<Option<RecordSet>, LookupError> {
    let fqdn = name::fqdn(dns_name);
    tokio::task::spawn_blocking(move || {
        let server_addr = SocketAddr::new(server, 53);
        let conn = UdpClientConnection::new(server_addr)
            .map_err(|e| LookupError::Other(format!("udp connection: {e}")))?;
        let client = SyncClient::new(conn);

        let query_name = Name::from_str(&fqdn)
            .map_err(|e| LookupError::Other(format!("invalid query name {fqdn:?}: {e}")))?;
        let query_type = to_hickory_type(rtype);

        let response = client
            .query(&query_name, DNSClass::IN, query_type)
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("timed out") || message.contains("timeout") {
                    LookupError::Timeout(message)
                } else {
                    LookupError::Other(message)
                }
            })?;

        if response.response_code() == ResponseCode::NXDomain {
            return Ok(None);
        }

        let mut values = Vec::new();
        let mut ttl: i64 = 0;
        for record in response.answers() {
            if record.record_type() != query_type {
                continue;
            }
            let Some(value) = rdata_to_value(record.data(), rtype) else {
                continue;
            };
            ttl = i64::from(record.ttl());
            values.push(value);
        }

        if values.is_empty() {
            return Ok(None);
        }
        values.sort();
        Ok(Some(RecordSet::new(rtype, ttl, values)))
    })
    .await
    .map_err(|e| LookupError::Other(format!("query task failed: {e}")))?
}

fn to_hickory_type(rtype: RecordType) -> hickory_client::rr::RecordType {
    match rtype {
        RecordType::A => hickory_client::rr::RecordType::A,
        RecordType::AAAA => hickory_client::rr::RecordType::AAAA,
        RecordType::CNAME => hickory_client::rr::RecordType::CNAME,
        RecordType::TXT => hickory_client::rr::RecordType::TXT,
        RecordType::NS => hickory_client::rr::RecordType::NS,
    }
}

fn rdata_to_value(data: Option<&RData>, rtype: RecordType) -> Option<String> {
    match (data, rtype) {
        (Some(RData::A(a)), RecordType::A) => Some(a.to_string()),
        (Some(RData::AAAA(aaaa)), RecordType::AAAA) => Some(aaaa.to_string()),
        (Some(RData::CNAME(cname)), RecordType::CNAME) => Some(name::normalize(&cname.0.to_utf8())),
        (Some(RData::NS(ns)), RecordType::NS) => Some(name::normalize(&ns.0.to_utf8())),
        (Some(RData::TXT(txt)), RecordType::TXT) => {
            let joined = txt
                .txt_data()
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk).to_string())
                .collect::<Vec<_>>()
                .join("");
            Some(ensure_quoted_text(&joined))
        }
        _ => None,
    }
}
