// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Background lookup processor.
//!
//! Entries whose hostname targets were expanded to addresses must be
//! re-resolved periodically: when the addresses behind a hostname change,
//! the entry has to be reconciled even though nothing changed in the
//! cluster. One processor per controller instance schedules these lookups
//! from a min-heap keyed by next due time and triggers a reconcile when a
//! job's address set changes without any timeout involved.

use crate::constants::LOOKUP_CHECK_PERIOD_SECS;
use crate::metrics;
use crate::resolver::{lookup_all_hostnames, HostsLookupResult, Resolver};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

/// Requests a reconcile of one entry, by key.
///
/// The production implementation writes the operation annotation on the
/// entry; tests record the keys.
#[async_trait]
pub trait ReconcileTrigger: Send + Sync {
    async fn trigger(&self, entry_key: &str);
}

/// One scheduled job.
#[derive(Clone, Debug)]
struct LookupJob {
    hostnames: Vec<String>,
    last_result: HostsLookupResult,
    next_time: Instant,
    interval: Duration,
    generation: u64,
}

#[derive(Default)]
struct ProcessorState {
    jobs: HashMap<String, LookupJob>,
    /// Min-heap of (due time, key, generation); stale generations are
    /// skipped on pop.
    heap: BinaryHeap<Reverse<(Instant, String, u64)>>,
    running: HashSet<String>,
    generation: u64,
}

/// Scheduler of periodic hostname re-resolutions.
pub struct LookupProcessor {
    resolver: Arc<dyn Resolver>,
    trigger: Arc<dyn ReconcileTrigger>,
    max_parallel: usize,
    state: Mutex<ProcessorState>,
    notify: Notify,
}

impl LookupProcessor {
    #[must_use]
    pub fn new(
        resolver: Arc<dyn Resolver>,
        trigger: Arc<dyn ReconcileTrigger>,
        max_concurrent_lookups: usize,
    ) -> Self {
        Self {
            resolver,
            trigger,
            max_parallel: max_concurrent_lookups.max(2),
            state: Mutex::new(ProcessorState::default()),
            notify: Notify::new(),
        }
    }

    /// Insert or replace the job for one entry.
    ///
    /// When the new result's address set differs from the previous job's
    /// and the new result saw no timeout, a reconcile is triggered
    /// immediately.
    pub async fn upsert(
        &self,
        entry_key: &str,
        hostnames: Vec<String>,
        result: HostsLookupResult,
        interval: Duration,
    ) {
        let changed = {
            let mut state = self.state.lock().expect("lookup processor poisoned");
            let changed = state
                .jobs
                .get(entry_key)
                .is_some_and(|job| job.last_result.all_ips() != result.all_ips());
            state.generation += 1;
            let generation = state.generation;
            let next_time = Instant::now() + interval;
            state.jobs.insert(
                entry_key.to_string(),
                LookupJob {
                    hostnames,
                    last_result: result.clone(),
                    next_time,
                    interval,
                    generation,
                },
            );
            state
                .heap
                .push(Reverse((next_time, entry_key.to_string(), generation)));
            #[allow(clippy::cast_possible_wrap)]
            metrics::LOOKUP_JOBS_GAUGE.set(state.jobs.len() as i64);
            changed
        };
        self.notify.notify_one();

        if changed && !result.has_timeout() {
            info!(entry = entry_key, "resolved addresses changed, triggering reconcile");
            self.trigger.trigger(entry_key).await;
        }
    }

    /// Remove the job for one entry.
    pub fn delete(&self, entry_key: &str) {
        let mut state = self.state.lock().expect("lookup processor poisoned");
        state.jobs.remove(entry_key);
        #[allow(clippy::cast_possible_wrap)]
        metrics::LOOKUP_JOBS_GAUGE.set(state.jobs.len() as i64);
        self.notify.notify_one();
    }

    /// Number of scheduled jobs. Metrics and test support.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .expect("lookup processor poisoned")
            .jobs
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the scheduler loop until the surrounding task is cancelled.
    pub async fn run(self: Arc<Self>) {
        info!("lookup processor started");
        loop {
            let wake_at = self.next_due().unwrap_or_else(|| {
                Instant::now() + Duration::from_secs(LOOKUP_CHECK_PERIOD_SECS)
            });
            tokio::select! {
                () = tokio::time::sleep_until(wake_at) => {}
                () = self.notify.notified() => {}
            }
            self.dispatch_due();
        }
    }

    /// Earliest due time over all jobs not currently running.
    fn next_due(&self) -> Option<Instant> {
        let state = self.state.lock().expect("lookup processor poisoned");
        state
            .jobs
            .iter()
            .filter(|(key, _)| !state.running.contains(*key))
            .map(|(_, job)| job.next_time)
            .min()
    }

    /// Start lookups for every due job, bounded by the parallelism limit.
    fn dispatch_due(self: &Arc<Self>) {
        let now = Instant::now();
        let due: Vec<(String, Vec<String>)> = {
            let mut state = self.state.lock().expect("lookup processor poisoned");
            let mut due = Vec::new();
            while due.len() + state.running.len() < self.max_parallel {
                // Pop the earliest valid heap entry.
                let Some(Reverse((at, key, generation))) = state.heap.peek().cloned() else {
                    break;
                };
                if at > now {
                    break;
                }
                state.heap.pop();
                let Some(job) = state.jobs.get(&key) else {
                    continue; // deleted
                };
                if job.generation != generation {
                    continue; // superseded by an upsert
                }
                if state.running.contains(&key) {
                    // Still running from the previous due time; skipped,
                    // not re-entered.
                    continue;
                }
                let hostnames = job.hostnames.clone();
                state.running.insert(key.clone());
                due.push((key, hostnames));
            }
            due
        };

        for (key, hostnames) in due {
            let this = self.clone();
            tokio::spawn(async move {
                this.run_job(&key, &hostnames).await;
            });
        }
    }

    async fn run_job(self: &Arc<Self>, key: &str, hostnames: &[String]) {
        debug!(entry = key, hosts = hostnames.len(), "running scheduled lookup");
        let result = lookup_all_hostnames(self.resolver.clone(), hostnames, self.max_parallel).await;
        metrics::record_lookup(if result.has_timeout() {
            "timeout"
        } else if result.all_not_found() {
            "not_found"
        } else if result.first_error().is_some() {
            "error"
        } else {
            "ok"
        });

        let changed = {
            let mut state = self.state.lock().expect("lookup processor poisoned");
            state.running.remove(key);
            if !state.jobs.contains_key(key) {
                return; // deleted while running
            }
            state.generation += 1;
            let new_generation = state.generation;
            let job = state.jobs.get_mut(key).expect("checked above");
            let changed = job.last_result.all_ips() != result.all_ips();
            // Timeouts do not count as change and do not overwrite the
            // last good result.
            if !result.has_timeout() {
                job.last_result = result.clone();
            }
            job.next_time = Instant::now() + job.interval;
            job.generation = new_generation;
            let rescheduled = (job.next_time, key.to_string(), job.generation);
            state.heap.push(Reverse(rescheduled));
            changed && !result.has_timeout()
        };
        self.notify.notify_one();

        if changed {
            info!(entry = key, "resolved addresses changed, triggering reconcile");
            self.trigger.trigger(key).await;
        }
    }
}

#[cfg(test)]
#[path = "lookup_tests.rs"]
mod lookup_tests;
