// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generates the CustomResourceDefinition manifests.
//!
//! Usage:
//!
//! ```bash
//! cargo run --bin crdgen > crds.yaml
//! kubectl apply -f crds.yaml
//! ```

use extdns::crd::{DNSAnnotation, DNSEntry, DNSProvider};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&DNSProvider::crd())?,
        serde_yaml::to_string(&DNSEntry::crd())?,
        serde_yaml::to_string(&DNSAnnotation::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}
