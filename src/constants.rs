// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the external DNS controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all DNS CRDs
pub const API_GROUP: &str = "dns.gardener.cloud";

/// API version for all DNS CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "dns.gardener.cloud/v1alpha1";

/// Kind name for `DNSProvider` resource
pub const KIND_DNS_PROVIDER: &str = "DNSProvider";

/// Kind name for `DNSEntry` resource
pub const KIND_DNS_ENTRY: &str = "DNSEntry";

/// Kind name for `DNSAnnotation` resource
pub const KIND_DNS_ANNOTATION: &str = "DNSAnnotation";

// ============================================================================
// Finalizers
// ============================================================================

/// Compound finalizer applied to providers, entries, and referenced secrets.
/// A single finalizer string is shared so that a provider, the secret it
/// references, and the entries assigned to it block deletion consistently.
pub const FINALIZER_COMPOUND: &str = "dns.gardener.cloud/compound";

// ============================================================================
// Annotations
// ============================================================================

/// Class annotation scoping controller responsibility
pub const ANNOTATION_CLASS: &str = "dns.gardener.cloud/class";

/// Selects host names from a source object's declared hostnames
pub const ANNOTATION_DNSNAMES: &str = "dns.gardener.cloud/dnsnames";

/// Opt-out annotation: `true`/`reconcile` report Ignored, `full` also drops the finalizer
pub const ANNOTATION_IGNORE: &str = "dns.gardener.cloud/ignore";

/// Hard ignore on targets: also skips deletion cleanup
pub const ANNOTATION_TARGET_HARD_IGNORE: &str = "dns.gardener.cloud/target-hard-ignore";

/// Restricts emitted address families: `ipv4`, `ipv6`, or `dual-stack`
pub const ANNOTATION_IP_STACK: &str = "dns.gardener.cloud/ip-stack";

/// Seconds between CNAME target expansions
pub const ANNOTATION_CNAME_LOOKUP_INTERVAL: &str = "dns.gardener.cloud/cname-lookup-interval";

/// Forces expansion of CNAME targets to addresses
pub const ANNOTATION_RESOLVE_TARGETS: &str = "dns.gardener.cloud/resolve-targets-to-addresses";

/// Operation annotation written by the lookup processor to force a reconcile
pub const ANNOTATION_OPERATION: &str = "gardener.cloud/operation";

/// Value of [`ANNOTATION_OPERATION`] that requests an immediate reconcile
pub const OPERATION_RECONCILE: &str = "reconcile";

/// Default controller class when no `class` annotation or config is present
pub const DEFAULT_CLASS: &str = "gardendns";

// ============================================================================
// Controller Defaults
// ============================================================================

/// Default concurrent syncs for the DNSProvider controller
pub const DEFAULT_PROVIDER_CONCURRENT_SYNCS: usize = 2;

/// Default concurrent syncs for the DNSEntry controller
pub const DEFAULT_ENTRY_CONCURRENT_SYNCS: usize = 5;

/// Default concurrent syncs for the DNSAnnotation controller
pub const DEFAULT_ANNOTATION_CONCURRENT_SYNCS: usize = 2;

/// Default number of parallel hostname lookups in the lookup processor
pub const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 2;

/// Default full resync period for providers (1 hour)
pub const DEFAULT_SYNC_PERIOD_SECS: u64 = 3600;

/// Default recheck period when a provider has no usable zones (5 minutes)
pub const DEFAULT_RECHECK_PERIOD_SECS: u64 = 300;

/// Default per-reconcile deadline (2 minutes)
pub const DEFAULT_RECONCILIATION_TIMEOUT_SECS: u64 = 120;

/// Default TTL applied to records when neither entry nor provider set one
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Default TTL for the cached zone list of an account (30 minutes)
pub const DEFAULT_ZONE_CACHE_TTL_SECS: u64 = 1800;

/// Default interval between CNAME target re-expansions (10 minutes)
pub const DEFAULT_CNAME_LOOKUP_INTERVAL_SECS: u64 = 600;

/// Debounce window after a successful update before the next reconcile (5 seconds)
pub const DEFAULT_RECONCILIATION_DELAY_SECS: u64 = 5;

/// Requeue delay when a dns name lock is contended (jitter is added on top)
pub const LOCK_REQUEUE_BASE_MILLIS: u64 = 3000;

/// Maximum jitter added to the lock-contention requeue delay
pub const LOCK_REQUEUE_JITTER_MILLIS: u64 = 500;

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Maximum backoff while waiting for referencing entries during provider deletion
pub const PROVIDER_DELETE_MAX_BACKOFF_SECS: u64 = 300;

// ============================================================================
// Rate Limiting Defaults
// ============================================================================

/// Default queries per second against a provider API, per account
pub const DEFAULT_RATE_LIMIT_QPS: f64 = 10.0;

/// Default burst size for the per-account token bucket
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 20;

/// Seconds per day, used to convert `requestsPerDay` into a qps value
pub const SECONDS_PER_DAY: f64 = 86400.0;

/// Default number of change requests submitted per execution batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

// ============================================================================
// DNS Cache Constants
// ============================================================================

/// Floor for caching negative authoritative answers (15 seconds)
pub const NEGATIVE_CACHE_TTL_SECS: u64 = 15;

/// Fixed wake-up period of the lookup processor when the heap is idle
pub const LOOKUP_CHECK_PERIOD_SECS: u64 = 15;

/// Maximum attempts for a single hostname lookup hitting timeouts
pub const LOOKUP_MAX_RETRIES: usize = 5;

/// Delay between lookup retry attempts
pub const LOOKUP_RETRY_DELAY_MILLIS: u64 = 500;

/// Bound on concurrent address expansions within one reconcile
pub const TARGET_EXPANSION_PARALLELISM: usize = 4;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election renew deadline (10 seconds)
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 10;

/// Default leader election retry period (2 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Server Constants
// ============================================================================

/// Default port for the health probe HTTP server
pub const HEALTH_SERVER_PORT: u16 = 2751;

/// Default port for the Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 2753;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness/readiness probe endpoint
pub const HEALTH_SERVER_PATH: &str = "/healthz";

/// Bind address for the HTTP servers
pub const SERVER_BIND_ADDRESS: &str = "0.0.0.0";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Graceful shutdown window for draining in-flight reconciles
pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// Exit code for a clean shutdown
pub const EXIT_CODE_OK: i32 = 0;

/// Exit code for an unrecoverable startup error
pub const EXIT_CODE_STARTUP_FAILURE: i32 = 1;

/// Exit code requesting a restart because CRD availability changed
pub const EXIT_CODE_CRD_CHANGED: i32 = 3;

// ============================================================================
// Event Constants
// ============================================================================

/// Window within which identical events on the same object are dropped
pub const EVENT_DEDUP_WINDOW_MILLIS: u64 = 1000;
