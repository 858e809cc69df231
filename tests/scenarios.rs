// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end scenarios driving the planning core against the in-memory
//! mock provider.

mod common;

use common::{entry_spec, status_of, text_spec, weighted_spec, Harness};
use extdns::dns::{DnsSetName, RecordType};
use extdns::errors::{ReconcileError, ResourceState};

/// Single provider, single entry: the record lands in the matching zone
/// with the provider's default TTL.
#[tokio::test]
async fn scenario_single_provider_single_entry() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com", "example2.com"], 360)
        .await;

    let spec = entry_spec("test.sub.example.com", &["1.2.3.4"], None);
    let outcome = harness
        .reconcile("default/e1", &spec, None, false)
        .await
        .unwrap();

    assert_eq!(outcome.state, ResourceState::Ready);
    assert_eq!(outcome.provider.as_deref(), Some("ns/p1"));
    assert_eq!(outcome.zone.as_deref(), Some("test:example.com"));
    assert_eq!(outcome.dns_name.as_deref(), Some("test.sub.example.com"));
    assert_eq!(outcome.ttl, Some(360));
    assert!(outcome.records_present);

    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    let set = &state[&DnsSetName::plain("test.sub.example.com")].sets[&RecordType::A];
    assert_eq!(set.ttl, 360);
    assert_eq!(set.records, vec!["1.2.3.4".to_string()]);

    // The sibling zone stays untouched.
    assert!(harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example2.com"))
        .is_empty());
}

/// Reconciling an unchanged entry produces no change requests.
#[tokio::test]
async fn scenario_reconcile_is_idempotent() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let spec = entry_spec("test.example.com", &["1.2.3.4"], None);
    let first = harness
        .reconcile("default/e1", &spec, None, false)
        .await
        .unwrap();
    assert!(first.executed > 0);

    let second = harness
        .reconcile("default/e1", &spec, Some(&status_of(&first)), false)
        .await
        .unwrap();
    assert_eq!(second.state, ResourceState::Ready);
    assert_eq!(second.executed, 0, "second pass must be a no-op");
}

/// A more specific provider appearing later takes the entry over; the
/// records move zones in one reconciliation.
#[tokio::test]
async fn scenario_best_match_reassignment() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com", "example2.com"], 360)
        .await;

    let spec = entry_spec("test.sub.example.com", &["1.2.3.4"], None);
    let first = harness
        .reconcile("default/e1", &spec, None, false)
        .await
        .unwrap();
    assert_eq!(first.zone.as_deref(), Some("test:example.com"));

    harness
        .add_provider("ns/p3", "p3", &["sub.example.com"], 360)
        .await;
    let second = harness
        .reconcile("default/e1", &spec, Some(&status_of(&first)), false)
        .await
        .unwrap();

    assert_eq!(second.provider.as_deref(), Some("ns/p3"));
    assert_eq!(second.zone.as_deref(), Some("p3:sub.example.com"));

    // Old zone cleaned, new zone populated.
    assert!(harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"))
        .is_empty());
    let state = harness
        .handler("p3")
        .zone_state(&Harness::zone("p3", "sub.example.com"));
    assert!(state.contains_key(&DnsSetName::plain("test.sub.example.com")));
}

/// A provider falling out of Ready keeps the entry Stale and the records
/// in place.
#[tokio::test]
async fn scenario_provider_not_ready_keeps_stale() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let spec = entry_spec("test.example.com", &["1.2.3.4"], None);
    let first = harness
        .reconcile("default/e1", &spec, None, false)
        .await
        .unwrap();

    harness.set_provider_state("ns/p1", ResourceState::Error);
    let second = harness
        .reconcile("default/e1", &spec, Some(&status_of(&first)), false)
        .await
        .unwrap();

    assert_eq!(second.state, ResourceState::Stale);
    assert_eq!(second.provider.as_deref(), Some("ns/p1"));
    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    assert!(
        state.contains_key(&DnsSetName::plain("test.example.com")),
        "records must be preserved while the provider is not ready"
    );
}

/// Switching targets from IPv4 to IPv6 replaces the A record set with an
/// AAAA record set.
#[tokio::test]
async fn scenario_cross_family_update() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let v4 = entry_spec("test.example.com", &["1.2.3.4"], None);
    let first = harness
        .reconcile("default/e1", &v4, None, false)
        .await
        .unwrap();

    let v6 = entry_spec("test.example.com", &["1234::5678"], None);
    let second = harness
        .reconcile("default/e1", &v6, Some(&status_of(&first)), false)
        .await
        .unwrap();

    assert_eq!(second.targets, Some(vec!["1234::5678".to_string()]));
    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    let sets = &state[&DnsSetName::plain("test.example.com")].sets;
    assert!(!sets.contains_key(&RecordType::A), "A record must be gone");
    assert_eq!(
        sets[&RecordType::AAAA].records,
        vec!["1234::5678".to_string()]
    );
}

/// Multiple hostname targets are expanded to a merged, sorted address
/// list and a recurring lookup job is scheduled.
#[tokio::test]
async fn scenario_cname_expansion() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;
    harness
        .resolver
        .set("service-1.example.com", &["127.0.1.1", "2001:db8::1:1"]);
    harness
        .resolver
        .set("service-2.example.com", &["127.0.2.1", "127.0.2.2"]);

    let spec = entry_spec(
        "svc.sub.example.com",
        &["service-1.example.com", "service-2.example.com"],
        Some(120),
    );
    let outcome = harness
        .reconcile("default/svc", &spec, None, false)
        .await
        .unwrap();

    assert_eq!(
        outcome.targets,
        Some(vec![
            "127.0.1.1".to_string(),
            "127.0.2.1".to_string(),
            "127.0.2.2".to_string(),
            "2001:db8::1:1".to_string(),
        ])
    );

    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    let sets = &state[&DnsSetName::plain("svc.sub.example.com")].sets;
    assert_eq!(
        sets[&RecordType::A].records,
        vec![
            "127.0.1.1".to_string(),
            "127.0.2.1".to_string(),
            "127.0.2.2".to_string()
        ]
    );
    assert_eq!(sets[&RecordType::A].ttl, 120);
    assert_eq!(
        sets[&RecordType::AAAA].records,
        vec!["2001:db8::1:1".to_string()]
    );

    // The lookup processor gets a recurring job.
    let update = outcome.lookup.expect("expansion must schedule lookups");
    assert_eq!(update.hostnames.len(), 2);
    harness
        .core
        .lookups
        .upsert("default/svc", update.hostnames, update.result, update.interval)
        .await;
    assert_eq!(harness.core.lookups.len(), 1);
}

/// Specifying both targets and text is rejected without touching any
/// zone.
#[tokio::test]
async fn scenario_validation_rejection() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let mut spec = entry_spec("bad.example.com", &["1.1.1.1"], None);
    spec.text = Some(vec!["foo".to_string()]);

    let err = harness
        .reconcile("default/bad", &spec, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Invalid(_)));
    assert!(err
        .to_string()
        .contains("cannot specify both targets and text fields"));

    assert!(harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"))
        .is_empty());
}

/// Deleting an entry removes its records from every zone it used.
#[tokio::test]
async fn scenario_delete_leaves_no_orphans() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let spec = entry_spec("test.example.com", &["1.2.3.4"], None);
    let first = harness
        .reconcile("default/e1", &spec, None, false)
        .await
        .unwrap();

    let cleanup = harness
        .reconcile("default/e1", &spec, Some(&status_of(&first)), true)
        .await
        .unwrap();
    assert!(!cleanup.records_present, "finalizer must be releasable");
    assert!(harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"))
        .is_empty());
}

/// TXT entries round-trip with quoted values.
#[tokio::test]
async fn scenario_text_entry() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let spec = text_spec("txt.example.com", &["v=spf1 -all"]);
    let outcome = harness
        .reconcile("default/txt", &spec, None, false)
        .await
        .unwrap();
    assert_eq!(outcome.state, ResourceState::Ready);
    assert_eq!(outcome.targets, Some(vec!["\"v=spf1 -all\"".to_string()]));

    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    let set = &state[&DnsSetName::plain("txt.example.com")].sets[&RecordType::TXT];
    assert_eq!(set.records, vec!["\"v=spf1 -all\"".to_string()]);

    // Idempotence holds for TXT as well.
    let second = harness
        .reconcile("default/txt", &spec, Some(&status_of(&outcome)), false)
        .await
        .unwrap();
    assert_eq!(second.executed, 0);
}

/// Routing-policy variants with distinct set identifiers coexist on one
/// dns name.
#[tokio::test]
async fn scenario_weighted_routing_variants() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;

    let blue = weighted_spec("w.example.com", &["1.1.1.1"], "blue", "10");
    let green = weighted_spec("w.example.com", &["2.2.2.2"], "green", "90");

    let blue_outcome = harness
        .reconcile("default/blue", &blue, None, false)
        .await
        .unwrap();
    let green_outcome = harness
        .reconcile("default/green", &green, None, false)
        .await
        .unwrap();
    assert_eq!(blue_outcome.state, ResourceState::Ready);
    assert_eq!(green_outcome.state, ResourceState::Ready);

    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    assert!(state.contains_key(&DnsSetName::new("w.example.com", "blue")));
    assert!(state.contains_key(&DnsSetName::new("w.example.com", "green")));

    // Each variant reconciles against its own state only.
    let again = harness
        .reconcile(
            "default/blue",
            &blue,
            Some(&status_of(&blue_outcome)),
            false,
        )
        .await
        .unwrap();
    assert_eq!(again.executed, 0);
}

/// A lookup timeout keeps the previous records instead of wiping them.
#[tokio::test(start_paused = true)]
async fn scenario_lookup_timeout_keeps_records() {
    let harness = Harness::new();
    harness
        .add_provider("ns/p1", "test", &["example.com"], 360)
        .await;
    harness.resolver.set("svc.backend.example.com", &["10.0.0.1"]);

    let mut spec = entry_spec("app.example.com", &["svc.backend.example.com"], None);
    spec.resolve_targets_to_addresses = Some(true);
    let first = harness
        .reconcile("default/app", &spec, None, false)
        .await
        .unwrap();
    assert_eq!(first.targets, Some(vec!["10.0.0.1".to_string()]));

    harness.resolver.set_error(
        "svc.backend.example.com",
        extdns::resolver::LookupError::Timeout("deadline".into()),
    );
    let second = harness
        .reconcile("default/app", &spec, Some(&status_of(&first)), false)
        .await
        .unwrap();
    assert_eq!(second.state, ResourceState::Stale);
    assert_eq!(
        second.targets,
        Some(vec!["10.0.0.1".to_string()]),
        "previous targets must be kept"
    );
    let state = harness
        .handler("test")
        .zone_state(&Harness::zone("test", "example.com"));
    assert!(state.contains_key(&DnsSetName::plain("app.example.com")));
}
