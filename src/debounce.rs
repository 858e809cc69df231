// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Post-update debounce cache.
//!
//! After the controller applies change requests for an entry, the
//! authoritative nameservers need a moment to converge. Reconciling again
//! inside that window would observe the pre-update records and oscillate.
//! The cache remembers when each entry was last updated; reconciles inside
//! the window requeue without doing any work. Reads do not refresh the
//! timestamp.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// TTL map from entry key to its last update instant.
#[derive(Clone)]
pub struct DebounceCache {
    window: Duration,
    updated: Arc<Mutex<HashMap<String, Instant>>>,
}

impl DebounceCache {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            updated: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record that change requests were just applied for `entry_key`.
    pub fn mark_updated(&self, entry_key: &str) {
        let mut updated = self.updated.lock().expect("debounce cache poisoned");
        updated.insert(entry_key.to_string(), Instant::now());
        // Expired stamps are dropped opportunistically on write.
        let window = self.window;
        updated.retain(|_, at| at.elapsed() < window);
    }

    /// Remaining debounce time for `entry_key`, or `None` when the entry is
    /// outside the window and may be reconciled.
    #[must_use]
    pub fn remaining(&self, entry_key: &str) -> Option<Duration> {
        let updated = self.updated.lock().expect("debounce cache poisoned");
        let at = updated.get(entry_key)?;
        self.window.checked_sub(at.elapsed()).filter(|d| !d.is_zero())
    }

    /// Clear the stamp for `entry_key`. Used when a forced reconcile (the
    /// operation annotation) must bypass the window.
    pub fn clear(&self, entry_key: &str) {
        self.updated
            .lock()
            .expect("debounce cache poisoned")
            .remove(entry_key);
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod debounce_tests;
