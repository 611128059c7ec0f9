//! Two-tier configuration CRDs
//!
//! - [`StrataClusterConfig`]: environment-wide defaults, exactly one per
//!   environment, selected by `strata.dev/type=cluster`. Absence is fatal.
//! - [`StrataProjectConfig`]: optional per-project overrides, selected by
//!   `strata.dev/type=project,strata.dev/project=<name>`. Zero-or-one.
//!
//! Both are loaded fresh at the start of each reconciliation pass and
//! discarded at its end.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// StrataClusterConfig carries environment metadata and per-kind field
/// defaults (merge level 2).
///
/// Example:
/// ```yaml
/// apiVersion: strata.dev/v1alpha1
/// kind: StrataClusterConfig
/// metadata:
///   name: prod
///   namespace: strata-system
///   labels:
///     strata.dev/type: cluster
/// spec:
///   environment:
///     name: prod
///     domain: prod.acme.internal
///     region: us-west-2
///   defaults:
///     service:
///       replicas: 3
///       resources:
///         cpu: 250m
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "StrataClusterConfig",
    namespaced,
    printcolumn = r#"{"name":"Environment","type":"string","jsonPath":".spec.environment.name"}"#,
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.environment.region"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StrataClusterConfigSpec {
    /// Environment metadata
    pub environment: EnvironmentMeta,

    /// Per-kind field defaults: `defaults[workloadKind][fieldPath] -> value`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl StrataClusterConfigSpec {
    /// Defaults table for one workload kind, if any
    pub fn defaults_for(&self, kind: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.defaults.get(kind)
    }
}

/// Environment metadata carried by the cluster config
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentMeta {
    /// Environment name (e.g. `prod`)
    pub name: String,

    /// DNS domain services are reachable under
    pub domain: String,

    /// Region identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// StrataProjectConfig carries per-instance override values (merge level 4,
/// the highest precedence).
///
/// Example:
/// ```yaml
/// apiVersion: strata.dev/v1alpha1
/// kind: StrataProjectConfig
/// metadata:
///   name: team-a
///   namespace: team-a
///   labels:
///     strata.dev/type: project
///     strata.dev/project: team-a
/// spec:
///   project: team-a
///   overrides:
///     api:
///       replicas: 10
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "StrataProjectConfig",
    namespaced,
    printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.project"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StrataProjectConfigSpec {
    /// Project this config is scoped to
    pub project: String,

    /// Per-instance overrides: `overrides[instanceName][fieldPath] -> value`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl StrataProjectConfigSpec {
    /// Overrides table for one instance, if any
    pub fn overrides_for(&self, instance: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.overrides.get(instance)
    }
}
