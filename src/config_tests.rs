// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::{ControllerManagerConfiguration, IN_CLUSTER};
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ControllerManagerConfiguration::parse("{}").unwrap();
        assert_eq!(config.class(), "gardendns");
        assert_eq!(config.controllers.dns_provider.concurrent_syncs, 2);
        assert_eq!(config.controllers.dns_provider.sync_period, 3600);
        assert_eq!(config.controllers.dns_provider.recheck_period, 300);
        assert_eq!(config.controllers.dns_provider.default_ttl, 300);
        assert_eq!(config.controllers.dns_provider.zone_cache_ttl, 1800);
        assert_eq!(config.controllers.dns_entry.concurrent_syncs, 5);
        assert_eq!(config.controllers.dns_entry.max_concurrent_lookups, 2);
        assert_eq!(
            config.controllers.dns_entry.default_cname_lookup_interval,
            600
        );
        assert_eq!(
            config.controllers.dns_entry.reconciliation_delay_after_update,
            5
        );
        assert_eq!(config.leader_election.lease_duration, 15);
        assert_eq!(config.leader_election.renew_deadline, 10);
        assert_eq!(config.leader_election.retry_period, 2);
        assert_eq!(config.server.health_probes.port, 2751);
        assert_eq!(config.server.metrics.port, 2753);
        assert!(config.controllers.dns_provider.default_rate_limits.enabled);
        assert!(!config.controllers.dns_provider.migration_mode);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
class: myclass
clientConnection:
  kubeconfig: /etc/kubeconfig
  qps: 50
  burst: 100
controlPlaneClientConnection:
  kubeconfig: IN-CLUSTER
leaderElection:
  leaderElect: false
  resourceName: my-lease
  leaseDuration: 30
server:
  metrics:
    port: 9090
controllers:
  dnsProvider:
    concurrentSyncs: 4
    enabledProviderTypes:
      - mock
    disabledProviderTypes:
      - aws-route53
    defaultTTL: 600
    migrationMode: true
  dnsEntry:
    concurrentSyncs: 10
    maxConcurrentLookups: 8
  source:
    targetNamePrefix: shoot-
providerAdvancedOptions:
  mock:
    batchSize: 10
    blockedZones:
      - blocked:zone
deployCRDs: true
"#;
        let config = ControllerManagerConfiguration::parse(yaml).unwrap();
        assert_eq!(config.class(), "myclass");
        assert_eq!(
            config.client_connection.kubeconfig.as_deref(),
            Some("/etc/kubeconfig")
        );
        let control_plane = config.control_plane_client_connection.as_ref().unwrap();
        assert_eq!(control_plane.kubeconfig.as_deref(), Some(IN_CLUSTER));
        assert!(control_plane.is_in_cluster());
        assert!(!config.leader_election.leader_elect);
        assert_eq!(config.leader_election.resource_name, "my-lease");
        assert_eq!(config.leader_election.lease_duration, 30);
        assert_eq!(config.server.metrics.port, 9090);
        assert_eq!(config.controllers.dns_provider.concurrent_syncs, 4);
        assert_eq!(config.controllers.dns_provider.default_ttl, 600);
        assert!(config.controllers.dns_provider.migration_mode);
        assert_eq!(config.controllers.dns_entry.max_concurrent_lookups, 8);
        assert_eq!(
            config.controllers.source.target_name_prefix.as_deref(),
            Some("shoot-")
        );
        assert!(config.deploy_crds);

        let options = config.advanced_options("mock");
        assert_eq!(options.batch_size, Some(10));
        assert_eq!(options.blocked_zones, vec!["blocked:zone".to_string()]);
        // Unknown types fall back to defaults.
        assert!(config.advanced_options("other").batch_size.is_none());
    }

    #[test]
    fn test_provider_type_gating() {
        let yaml = r#"
controllers:
  dnsProvider:
    enabledProviderTypes: [mock, aws-route53]
    disabledProviderTypes: [aws-route53]
"#;
        let config = ControllerManagerConfiguration::parse(yaml).unwrap();
        let provider = &config.controllers.dns_provider;
        assert!(provider.provider_type_enabled("mock"));
        assert!(!provider.provider_type_enabled("aws-route53"));
        assert!(!provider.provider_type_enabled("google-clouddns"));

        let open = ControllerManagerConfiguration::parse("{}").unwrap();
        assert!(open.controllers.dns_provider.provider_type_enabled("mock"));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(ControllerManagerConfiguration::parse("leaderElection: [").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "class: fromfile").unwrap();
        let config = ControllerManagerConfiguration::load(file.path())
            .await
            .unwrap();
        assert_eq!(config.class(), "fromfile");
    }

    #[tokio::test]
    async fn test_load_missing_file_is_an_error() {
        let missing = std::path::Path::new("/does/not/exist.yaml");
        assert!(ControllerManagerConfiguration::load(missing).await.is_err());
    }
}
