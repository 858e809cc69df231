// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Accounts: one logical provider session per unique credential set.
//!
//! Two DNSProviders carrying byte-identical credentials for the same
//! provider type share one [`Account`]. The account owns the connection to
//! the provider API and everything whose cost scales with API calls: the
//! token-bucket rate limiter, the cached zone list, the optional zone
//! state cache, and the authoritative DNS cache. Reference counting tears
//! the account down when the last provider releases it.

pub mod authoritative;
pub mod dns_cache;
pub mod rate_limit;

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ZONE_CACHE_TTL_SECS};
use crate::dns::{DnsSets, ZoneId};
use crate::provider::{
    ChangeRequest, DnsHandler, DoneHandler, HandlerConfig, HandlerRegistry, HostedZone,
    ProviderError,
};
use authoritative::AuthoritativeResolver;
use dns_cache::{AuthoritativeCache, CacheKey};
use rate_limit::{RateLimiter, RateLimiterOptions};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Everything needed to obtain (or construct) an account.
#[derive(Clone)]
pub struct AccountConfig {
    pub provider_type: String,
    /// Decoded credential properties (secret data keys)
    pub properties: BTreeMap<String, String>,
    /// Opaque per-type payload from `spec.providerConfig`
    pub provider_config: Option<serde_json::Value>,
    pub rate_limit: RateLimiterOptions,
    pub zone_cache_ttl: Duration,
    pub batch_size: usize,
    /// Zone ids excluded from listings (global or per-type config)
    pub blocked_zones: Vec<String>,
}

impl AccountConfig {
    #[must_use]
    pub fn new(provider_type: &str, properties: BTreeMap<String, String>) -> Self {
        Self {
            provider_type: provider_type.to_string(),
            properties,
            provider_config: None,
            rate_limit: RateLimiterOptions::default(),
            zone_cache_ttl: Duration::from_secs(DEFAULT_ZONE_CACHE_TTL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            blocked_zones: Vec::new(),
        }
    }
}

/// Hash identifying one credential set.
///
/// Computed over the provider type and the sorted key/value pairs of the
/// properties map. The hash, never the properties, is what appears in
/// logs.
#[must_use]
pub fn account_hash(provider_type: &str, properties: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider_type.as_bytes());
    hasher.update([0u8]);
    for (key, value) in properties {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

struct CachedZones {
    zones: Vec<HostedZone>,
    fetched_at: Instant,
}

/// One provider session shared by all DNSProviders with the same
/// credentials.
pub struct Account {
    hash: String,
    provider_type: String,
    handler: Arc<dyn DnsHandler>,
    rate_limiter: RateLimiter,
    zone_cache_ttl: Duration,
    batch_size: usize,
    blocked_zones: Vec<String>,
    zones: Mutex<Option<CachedZones>>,
    zone_states: Mutex<HashMap<ZoneId, (DnsSets, Instant)>>,
    dns_cache: AuthoritativeCache,
    clients: AtomicUsize,
}

impl Account {
    fn new(
        config: &AccountConfig,
        hash: String,
        handler: Arc<dyn DnsHandler>,
        resolver: Arc<dyn AuthoritativeResolver>,
    ) -> Self {
        Self {
            hash,
            provider_type: config.provider_type.clone(),
            handler,
            rate_limiter: RateLimiter::new(config.rate_limit),
            zone_cache_ttl: config.zone_cache_ttl,
            batch_size: config.batch_size.max(1),
            blocked_zones: config.blocked_zones.clone(),
            zones: Mutex::new(None),
            zone_states: Mutex::new(HashMap::new()),
            dns_cache: AuthoritativeCache::new(resolver),
            clients: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    /// The underlying handler. Exposed for target mapping and tests.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn DnsHandler> {
        self.handler.clone()
    }

    /// Number of DNSProviders currently referencing this account.
    #[must_use]
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn dns_cache(&self) -> &AuthoritativeCache {
        &self.dns_cache
    }

    #[must_use]
    pub fn rate_limit(&self) -> RateLimiterOptions {
        self.rate_limiter.options()
    }

    /// Hosted zones of this account, from cache when fresh.
    ///
    /// Blocked zones are filtered before the list is cached, so they are
    /// invisible to selection and to `find_account_for_zone`.
    pub async fn get_zones(&self) -> Result<Vec<HostedZone>, ProviderError> {
        {
            let cached = self.zones.lock().expect("zone cache poisoned");
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.zone_cache_ttl {
                    return Ok(entry.zones.clone());
                }
            }
        }

        self.rate_limiter.acquire().await;
        let mut zones = self.handler.list_zones().await?;
        zones.retain(|z| !self.blocked_zones.contains(&z.id.id));
        debug!(
            account = %self.hash,
            zones = zones.len(),
            "refreshed account zone list"
        );

        let mut cached = self.zones.lock().expect("zone cache poisoned");
        *cached = Some(CachedZones {
            zones: zones.clone(),
            fetched_at: Instant::now(),
        });
        Ok(zones)
    }

    /// Domain of a hosted zone from the cached list, if known.
    pub async fn zone_domain(&self, zone: &ZoneId) -> Result<String, ProviderError> {
        let zones = self.get_zones().await?;
        zones
            .iter()
            .find(|z| &z.id == zone)
            .map(|z| z.domain.clone())
            .ok_or_else(|| ProviderError::ZoneNotFound(zone.clone()))
    }

    /// Record state of one zone via the provider API, cached with the
    /// zone-cache TTL and invalidated by [`Self::execute_requests`].
    ///
    /// Used for routing-policy variants that plain DNS cannot observe.
    pub async fn get_zone_state(&self, zone: &ZoneId) -> Result<DnsSets, ProviderError> {
        {
            let states = self.zone_states.lock().expect("zone state cache poisoned");
            if let Some((sets, fetched_at)) = states.get(zone) {
                if fetched_at.elapsed() < self.zone_cache_ttl {
                    return Ok(sets.clone());
                }
            }
        }

        self.rate_limiter.acquire().await;
        let sets = self.handler.get_zone_state(zone).await?;
        self.zone_states
            .lock()
            .expect("zone state cache poisoned")
            .insert(zone.clone(), (sets.clone(), Instant::now()));
        Ok(sets)
    }

    /// Execute change requests against one zone under the rate limiter.
    ///
    /// Requests are submitted in batches. On success the affected
    /// authoritative-cache keys and the zone state cache are invalidated
    /// so subsequent reads observe the new records.
    pub async fn execute_requests(
        &self,
        zone: &ZoneId,
        requests: &[ChangeRequest],
        done: &dyn DoneHandler,
    ) -> Result<(), ProviderError> {
        if requests.is_empty() {
            return Ok(());
        }

        for batch in requests.chunks(self.batch_size) {
            self.rate_limiter.acquire().await;
            self.handler.execute_requests(zone, batch, done).await?;
        }

        let keys: Vec<CacheKey> = requests
            .iter()
            .map(|r| (r.name.clone(), r.rtype))
            .collect();
        self.dns_cache.invalidate(&keys);
        self.zone_states
            .lock()
            .expect("zone state cache poisoned")
            .remove(zone);
        Ok(())
    }

    fn teardown(&self) {
        self.dns_cache.clear();
        self.zones.lock().expect("zone cache poisoned").take();
        self.zone_states
            .lock()
            .expect("zone state cache poisoned")
            .clear();
    }
}

/// Registry of live accounts, keyed by credential hash.
pub struct AccountMap {
    registry: HandlerRegistry,
    resolver: Arc<dyn AuthoritativeResolver>,
    accounts: Mutex<HashMap<String, Arc<Account>>>,
}

impl AccountMap {
    #[must_use]
    pub fn new(registry: HandlerRegistry, resolver: Arc<dyn AuthoritativeResolver>) -> Self {
        Self {
            registry,
            resolver,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Obtain the account for a credential set, constructing it on first
    /// use. Increments the reference count.
    pub fn get(&self, config: &AccountConfig) -> Result<Arc<Account>, ProviderError> {
        let hash = account_hash(&config.provider_type, &config.properties);
        let mut accounts = self.accounts.lock().expect("account map poisoned");

        if let Some(existing) = accounts.get(&hash) {
            existing.clients.fetch_add(1, Ordering::SeqCst);
            return Ok(existing.clone());
        }

        let factory = self.registry.get(&config.provider_type)?;
        let handler = factory.create(HandlerConfig {
            properties: config.properties.clone(),
            provider_config: config.provider_config.clone(),
        })?;
        let account = Arc::new(Account::new(
            config,
            hash.clone(),
            handler,
            self.resolver.clone(),
        ));
        account.clients.store(1, Ordering::SeqCst);
        info!(
            provider_type = %config.provider_type,
            account = %hash,
            "created provider account"
        );
        accounts.insert(hash, account.clone());
        Ok(account)
    }

    /// Release one reference. The account and its caches are discarded
    /// when the count reaches zero.
    pub fn release(&self, account: &Arc<Account>) {
        let mut accounts = self.accounts.lock().expect("account map poisoned");
        let remaining = account.clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        if remaining == 0 {
            accounts.remove(account.hash());
            account.teardown();
            info!(account = %account.hash(), "released last reference, account torn down");
        }
    }

    /// Find the account currently listing `zone`.
    ///
    /// Used for cross-zone cleanup after an entry migrated away from a
    /// provider that no longer exists.
    pub async fn find_account_for_zone(&self, zone: &ZoneId) -> Option<Arc<Account>> {
        let snapshot: Vec<Arc<Account>> = {
            let accounts = self.accounts.lock().expect("account map poisoned");
            accounts.values().cloned().collect()
        };
        for account in snapshot {
            if account.provider_type() != zone.provider_type {
                continue;
            }
            match account.get_zones().await {
                Ok(zones) if zones.iter().any(|z| &z.id == zone) => return Some(account),
                Ok(_) => {}
                Err(e) => {
                    debug!(account = %account.hash(), error = %e,
                        "skipping account while searching for zone owner");
                }
            }
        }
        None
    }

    /// Number of live accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.lock().expect("account map poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
