// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hostname resolution with timeout retries.
//!
//! The entry reconciler expands CNAME targets to addresses and the lookup
//! processor re-resolves them periodically. Both go through the
//! [`Resolver`] trait so tests can script answers. Failures are classified
//! into timeout / not-found / other because the callers treat them very
//! differently: timeouts keep the previous state, NXDOMAIN across all
//! hostnames surfaces an error.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::constants::{LOOKUP_MAX_RETRIES, LOOKUP_RETRY_DELAY_MILLIS};

/// Classified resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out: {0}")]
    Timeout(String),

    #[error("name not found: {0}")]
    NotFound(String),

    #[error("lookup failed: {0}")]
    Other(String),
}

impl LookupError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, LookupError::Timeout(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound(_))
    }
}

impl From<ResolveError> for LookupError {
    fn from(err: ResolveError) -> Self {
        match err.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => LookupError::NotFound(err.to_string()),
            ResolveErrorKind::Timeout => LookupError::Timeout(err.to_string()),
            _ => LookupError::Other(err.to_string()),
        }
    }
}

/// Recursive hostname resolution.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// All A/AAAA addresses of a hostname.
    async fn lookup_ips(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError>;
}

/// [`Resolver`] backed by the system resolver configuration.
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    /// Build a resolver from `/etc/resolv.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error when the system resolver configuration cannot be
    /// read.
    pub fn from_system_conf() -> Result<Self, LookupError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf().map_err(LookupError::from)?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_ips(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
        let lookup = self.inner.lookup_ip(hostname).await?;
        Ok(lookup.iter().collect())
    }
}

/// Resolve one hostname, retrying timeouts.
///
/// Up to [`LOOKUP_MAX_RETRIES`] attempts with a fixed delay between them;
/// non-timeout failures are returned immediately.
pub async fn lookup_with_retry(
    resolver: &dyn Resolver,
    hostname: &str,
) -> Result<Vec<IpAddr>, LookupError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match resolver.lookup_ips(hostname).await {
            Ok(ips) => return Ok(ips),
            Err(err) if err.is_timeout() && attempt < LOOKUP_MAX_RETRIES => {
                debug!(
                    hostname = hostname,
                    attempt = attempt,
                    "lookup timed out, retrying"
                );
                tokio::time::sleep(Duration::from_millis(LOOKUP_RETRY_DELAY_MILLIS)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Outcome of resolving all hostnames of one entry.
#[derive(Clone, Debug, Default)]
pub struct HostsLookupResult {
    /// Per-hostname outcome, keyed by hostname
    pub per_host: BTreeMap<String, Result<Vec<IpAddr>, LookupError>>,
}

impl HostsLookupResult {
    /// Sorted, de-duplicated union of all resolved addresses.
    #[must_use]
    pub fn all_ips(&self) -> Vec<IpAddr> {
        let mut ips: Vec<IpAddr> = self
            .per_host
            .values()
            .filter_map(|r| r.as_ref().ok())
            .flatten()
            .copied()
            .collect();
        ips.sort();
        ips.dedup();
        ips
    }

    /// Whether any hostname failed with a timeout.
    #[must_use]
    pub fn has_timeout(&self) -> bool {
        self.per_host
            .values()
            .any(|r| r.as_ref().is_err_and(LookupError::is_timeout))
    }

    /// Whether every hostname failed with NXDOMAIN.
    #[must_use]
    pub fn all_not_found(&self) -> bool {
        !self.per_host.is_empty()
            && self
                .per_host
                .values()
                .all(|r| r.as_ref().is_err_and(LookupError::is_not_found))
    }

    /// First non-timeout failure, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&LookupError> {
        self.per_host
            .values()
            .filter_map(|r| r.as_ref().err())
            .find(|e| !e.is_timeout())
    }
}

/// Resolve a set of hostnames concurrently, bounded by `max_parallel`.
pub async fn lookup_all_hostnames(
    resolver: Arc<dyn Resolver>,
    hostnames: &[String],
    max_parallel: usize,
) -> HostsLookupResult {
    let outcomes = stream::iter(hostnames.iter().cloned())
        .map(|hostname| {
            let resolver = resolver.clone();
            async move {
                let result = lookup_with_retry(resolver.as_ref(), &hostname).await;
                (hostname, result)
            }
        })
        .buffer_unordered(max_parallel.max(1))
        .collect::<Vec<_>>()
        .await;

    HostsLookupResult {
        per_host: outcomes.into_iter().collect(),
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;
