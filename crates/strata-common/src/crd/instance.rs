//! WorkloadInstance CRD - a single deployable workload description
//!
//! A WorkloadInstance is the unit of reconciliation. Its spec carries the
//! workload kind, the instance's own field values (merge level 3, with any
//! upstream template placeholders already resolved by the renderer), and the
//! declaration of which resolved fields it publishes for other instances.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Condition, InstancePhase, WorkloadKind};

/// WorkloadInstance describes one deployable workload.
///
/// Example:
/// ```yaml
/// apiVersion: strata.dev/v1alpha1
/// kind: WorkloadInstance
/// metadata:
///   name: api
///   namespace: team-a
/// spec:
///   kind: service
///   values:
///     image: ghcr.io/acme/api:1.4.2
///     replicas: 5
///     env:
///       DB_HOST: outputs/db/host
///       DB_PASSWORD: connections/db/password
///   publish:
///     - key: endpoint
///       from: port
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "WorkloadInstance",
    namespaced,
    status = "WorkloadInstanceStatus",
    printcolumn = r#"{"name":"Kind","type":"string","jsonPath":".spec.kind"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadInstanceSpec {
    /// Workload kind; keys cluster defaults and selects the base skeleton
    pub kind: WorkloadKind,

    /// The instance's own field values (merge level 3).
    ///
    /// String values under `values.env` may be symbolic references
    /// (`outputs/...`, `connections/...`, `secrets/...`, `configs/...`).
    /// An absent or explicitly null top-level value skips this merge level;
    /// it does not erase cluster or composition defaults.
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,

    /// Resolved fields this instance publishes for other instances to read
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publish: Vec<PublishSpec>,
}

/// Declaration of one publishable field
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishSpec {
    /// Key under which the value is published
    pub key: String,

    /// Dotted path into the resolved values (e.g. `port`, `env.DB_NAME`)
    pub from: String,

    /// Sensitive values go to the `<name>-conn` secret and are only ever
    /// consumed by pointer; non-sensitive values land in `status.outputs`
    #[serde(default)]
    pub sensitive: bool,
}

/// WorkloadInstance status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadInstanceStatus {
    /// Current stage of the reconciliation pass
    #[serde(default)]
    pub phase: InstancePhase,

    /// Conditions describing the outcome of the last pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Published outputs: literal-safe key/value data other instances read
    /// through `outputs/` references. Overwritten in full on every
    /// successful reconcile.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,

    /// Generation observed by the last completed pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_instance_yaml() {
        let yaml = r#"
apiVersion: strata.dev/v1alpha1
kind: WorkloadInstance
metadata:
  name: api
  namespace: team-a
spec:
  kind: service
  values:
    image: ghcr.io/acme/api:1.4.2
"#;
        let instance: WorkloadInstance = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(instance.spec.kind, WorkloadKind::Service);
        assert_eq!(
            instance.spec.values.get("image").and_then(|v| v.as_str()),
            Some("ghcr.io/acme/api:1.4.2")
        );
        assert!(instance.spec.publish.is_empty());
    }

    #[test]
    fn instance_with_references_and_publish_yaml() {
        let yaml = r#"
apiVersion: strata.dev/v1alpha1
kind: WorkloadInstance
metadata:
  name: api
  namespace: team-a
spec:
  kind: service
  values:
    image: ghcr.io/acme/api:1.4.2
    replicas: 5
    env:
      DB_HOST: outputs/db/host
      DB_PASSWORD: connections/db/password
  publish:
    - key: endpoint
      from: port
    - key: apiToken
      from: env.API_TOKEN
      sensitive: true
"#;
        let instance: WorkloadInstance = serde_yaml::from_str(yaml).expect("parse");
        let env = instance.spec.values.get("env").expect("env present");
        assert_eq!(
            env.get("DB_PASSWORD").and_then(|v| v.as_str()),
            Some("connections/db/password")
        );
        assert_eq!(instance.spec.publish.len(), 2);
        assert!(!instance.spec.publish[0].sensitive);
        assert!(instance.spec.publish[1].sensitive);
    }

    #[test]
    fn status_defaults_to_pending() {
        let status = WorkloadInstanceStatus::default();
        assert_eq!(status.phase, InstancePhase::Pending);
        assert!(status.conditions.is_empty());
        assert!(status.outputs.is_empty());
    }
}
