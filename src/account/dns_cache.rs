// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-account cache of authoritative record answers.
//!
//! Keys are `(dns name, set identifier, record type)`. A miss triggers a
//! query against the zone's authoritative nameservers; positive answers
//! are cached until the record's own TTL expires, negative answers for a
//! fixed 15 second floor. The entry reconciler invalidates affected keys
//! right after executing change requests so the next reconcile observes
//! the post-update state.

use super::authoritative::AuthoritativeResolver;
use crate::constants::NEGATIVE_CACHE_TTL_SECS;
use crate::dns::{DnsSetName, RecordSet, RecordType};
use crate::resolver::LookupError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// Cache key: one record type of one dns set name.
pub type CacheKey = (DnsSetName, RecordType);

struct CacheEntry {
    record_set: Option<RecordSet>,
    expires_at: Instant,
}

/// TTL cache in front of an [`AuthoritativeResolver`].
pub struct AuthoritativeCache {
    resolver: Arc<dyn AuthoritativeResolver>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    negative_ttl: Duration,
}

impl AuthoritativeCache {
    #[must_use]
    pub fn new(resolver: Arc<dyn AuthoritativeResolver>) -> Self {
        Self {
            resolver,
            entries: Mutex::new(HashMap::new()),
            negative_ttl: Duration::from_secs(NEGATIVE_CACHE_TTL_SECS),
        }
    }

    /// Observed record set for one key, queried on miss.
    ///
    /// `zone_domain` names the zone whose nameservers are asked. Names
    /// carrying a set identifier must not come through here: plain DNS
    /// cannot discriminate routing-policy variants, so those are observed
    /// through the provider zone state and inserted via [`Self::insert`].
    pub async fn get(
        &self,
        zone_domain: &str,
        set_name: &DnsSetName,
        rtype: RecordType,
    ) -> Result<Option<RecordSet>, LookupError> {
        let key = (set_name.clone(), rtype);
        {
            let entries = self.entries.lock().expect("dns cache poisoned");
            if let Some(entry) = entries.get(&key) {
                if entry.expires_at > Instant::now() {
                    trace!(key = %set_name, rtype = %rtype, "authoritative cache hit");
                    return Ok(entry.record_set.clone());
                }
            }
        }

        let answer = self
            .resolver
            .query(zone_domain, &set_name.dns_name, rtype)
            .await?;
        self.store(key, answer.clone());
        Ok(answer)
    }

    /// Insert an externally observed answer (provider zone state path).
    pub fn insert(&self, set_name: &DnsSetName, rtype: RecordType, answer: Option<RecordSet>) {
        self.store((set_name.clone(), rtype), answer);
    }

    /// Drop the given keys so the next read re-queries.
    pub fn invalidate(&self, keys: &[CacheKey]) {
        let mut entries = self.entries.lock().expect("dns cache poisoned");
        for key in keys {
            entries.remove(key);
        }
    }

    /// Drop everything. Used on account teardown.
    pub fn clear(&self) {
        self.entries.lock().expect("dns cache poisoned").clear();
    }

    /// Number of live (possibly expired) entries. Metrics support.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("dns cache poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, key: CacheKey, answer: Option<RecordSet>) {
        // Positive answers live as long as the record itself; the
        // negative floor also guards against zero-TTL records.
        let ttl = match &answer {
            Some(set) if set.ttl > 0 => u64::try_from(set.ttl)
                .map(Duration::from_secs)
                .unwrap_or(self.negative_ttl),
            _ => self.negative_ttl,
        };
        let mut entries = self.entries.lock().expect("dns cache poisoned");
        entries.insert(
            key,
            CacheEntry {
                record_set: answer,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
#[path = "dns_cache_tests.rs"]
mod dns_cache_tests;
