// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! All-or-nothing dns-name locks.
//!
//! Two entries sharing a dns name (or an entry migrating between names)
//! must not be reconciled concurrently. The lock registry holds the set of
//! names currently being worked on; a reconcile acquires all of its names
//! atomically or none of them. Callers that cannot acquire immediately
//! requeue instead of blocking a worker.

use crate::dns::name;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Registry of currently held dns names.
///
/// Cloning shares the underlying set. Lock ordering problems cannot arise
/// because acquisition is atomic over the whole requested name set.
#[derive(Clone, Default)]
pub struct NameLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl NameLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to acquire every name in `names` at once.
    ///
    /// Names are normalized and de-duplicated before acquisition. Returns
    /// `None` if any requested name is already held; in that case nothing
    /// is acquired and the caller should requeue.
    #[must_use]
    pub fn try_lock(&self, names: &[&str]) -> Option<NameLockGuard> {
        let requested: HashSet<String> = names
            .iter()
            .filter(|n| !n.is_empty())
            .map(|n| name::normalize(n))
            .collect();
        if requested.is_empty() {
            return Some(NameLockGuard {
                locks: self.clone(),
                names: Vec::new(),
            });
        }

        let mut held = self.held.lock().expect("name lock registry poisoned");
        if requested.iter().any(|n| held.contains(n)) {
            return None;
        }
        for n in &requested {
            held.insert(n.clone());
        }
        Some(NameLockGuard {
            locks: self.clone(),
            names: requested.into_iter().collect(),
        })
    }

    /// Whether a name is currently held. Intended for tests and metrics.
    #[must_use]
    pub fn is_held(&self, dns_name: &str) -> bool {
        self.held
            .lock()
            .expect("name lock registry poisoned")
            .contains(&name::normalize(dns_name))
    }

    fn release(&self, names: &[String]) {
        let mut held = self.held.lock().expect("name lock registry poisoned");
        for n in names {
            held.remove(n);
        }
    }
}

/// Guard releasing the acquired names on drop.
pub struct NameLockGuard {
    locks: NameLocks,
    names: Vec<String>,
}

impl Drop for NameLockGuard {
    fn drop(&mut self) {
        self.locks.release(&self.names);
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod locks_tests;
