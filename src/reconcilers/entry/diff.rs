// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record-set diffing.
//!
//! Compares the desired record sets of one entry against everything
//! observed at its old and new locations and plans the minimal set of
//! record-level changes, grouped per zone. Anything observed away from the
//! desired `(zone, name)` is deleted; co-located sets are updated when
//! they differ and left alone when they match.

use crate::dns::{DnsSetName, RecordSet, RecordType, ZoneId};
use crate::provider::ChangeRequest;
use std::collections::BTreeMap;

/// One observed record set with its location.
#[derive(Clone, Debug)]
pub struct ObservedRecordSet {
    pub zone: ZoneId,
    pub name: DnsSetName,
    pub record_set: RecordSet,
}

/// Change requests planned for one reconcile, grouped per zone.
pub type ZonedChanges = BTreeMap<ZoneId, Vec<ChangeRequest>>;

/// Compute the change requests turning `observed` into `desired`.
///
/// `desired` may be empty (entry deletion): everything observed is then
/// planned for deletion. The result groups requests by zone so the
/// executor can run cross-zone deletions against their owning accounts
/// first.
#[must_use]
pub fn compute_changes(
    new_zone: &ZoneId,
    new_name: &DnsSetName,
    desired: &BTreeMap<RecordType, RecordSet>,
    observed: &[ObservedRecordSet],
) -> ZonedChanges {
    let mut changes: ZonedChanges = BTreeMap::new();
    let mut satisfied: Vec<RecordType> = Vec::new();
    let mut updated: Vec<RecordType> = Vec::new();

    for obs in observed {
        let co_located = &obs.zone == new_zone && &obs.name == new_name;
        let rtype = obs.record_set.rtype;

        if !co_located || !desired.contains_key(&rtype) {
            changes
                .entry(obs.zone.clone())
                .or_default()
                .push(ChangeRequest::delete(
                    obs.name.clone(),
                    obs.record_set.clone(),
                ));
            continue;
        }

        let wanted = &desired[&rtype];
        if wanted.matches(&obs.record_set) {
            satisfied.push(rtype);
        } else {
            updated.push(rtype);
            changes
                .entry(obs.zone.clone())
                .or_default()
                .push(ChangeRequest::update(
                    new_name.clone(),
                    obs.record_set.clone(),
                    wanted.clone(),
                ));
        }
    }

    for (rtype, wanted) in desired {
        if satisfied.contains(rtype) || updated.contains(rtype) {
            continue;
        }
        changes
            .entry(new_zone.clone())
            .or_default()
            .push(ChangeRequest::create(new_name.clone(), wanted.clone()));
    }

    changes
}

/// Whether the planned changes are empty (desired equals observed).
#[must_use]
pub fn is_noop(changes: &ZonedChanges) -> bool {
    changes.values().all(Vec::is_empty)
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
