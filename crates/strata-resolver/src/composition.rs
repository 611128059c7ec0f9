//! Composition-level field declarations
//!
//! Each workload kind declares the field paths the patch stage consumes,
//! whether they are required, and the composition's hardcoded default
//! (the lowest merge level). Field paths not declared here are ignored by
//! resolution; the renderer upstream owns schema validation.

use serde_json::{json, Value};
use strata_common::crd::WorkloadKind;

/// Declaration of one field the patch stage consumes
#[derive(Clone, Debug)]
pub struct FieldSpec {
    /// Top-level field path in the values map
    pub path: &'static str,
    /// Whether resolution must produce a value for this field
    pub required: bool,
    /// Composition default (merge level 1), if any
    pub default: Option<Value>,
}

impl FieldSpec {
    fn required(path: &'static str) -> Self {
        Self {
            path,
            required: true,
            default: None,
        }
    }

    fn with_default(path: &'static str, default: Value) -> Self {
        Self {
            path,
            required: true,
            default: Some(default),
        }
    }

    fn optional(path: &'static str) -> Self {
        Self {
            path,
            required: false,
            default: None,
        }
    }
}

fn default_resources() -> Value {
    json!({ "cpu": "100m", "memory": "128Mi" })
}

/// Declared fields for a workload kind
pub fn field_specs(kind: WorkloadKind) -> Vec<FieldSpec> {
    match kind {
        WorkloadKind::Service => vec![
            FieldSpec::required("image"),
            FieldSpec::with_default("replicas", json!(1)),
            FieldSpec::with_default("port", json!(8080)),
            FieldSpec::with_default("env", json!({})),
            FieldSpec::with_default("resources", default_resources()),
            FieldSpec::optional("labels"),
        ],
        WorkloadKind::Worker => vec![
            FieldSpec::required("image"),
            FieldSpec::with_default("replicas", json!(1)),
            FieldSpec::with_default("env", json!({})),
            FieldSpec::with_default("resources", default_resources()),
            FieldSpec::optional("labels"),
        ],
        WorkloadKind::Job => vec![
            FieldSpec::required("image"),
            FieldSpec::with_default("backoffLimit", json!(3)),
            FieldSpec::with_default("env", json!({})),
            FieldSpec::with_default("resources", default_resources()),
            FieldSpec::optional("labels"),
        ],
        // Secrets/config bundles carry only their data tables:
        // data[resource][key] -> value, emitted as `<instance>-<resource>`.
        WorkloadKind::Secrets | WorkloadKind::Config => vec![FieldSpec::required("data")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_declares_image_as_required_without_default() {
        let specs = field_specs(WorkloadKind::Service);
        let image = specs.iter().find(|s| s.path == "image").expect("image");
        assert!(image.required);
        assert!(image.default.is_none());
    }

    #[test]
    fn service_replicas_default_is_one() {
        let specs = field_specs(WorkloadKind::Service);
        let replicas = specs.iter().find(|s| s.path == "replicas").expect("replicas");
        assert_eq!(replicas.default, Some(json!(1)));
    }

    #[test]
    fn bundles_require_data() {
        for kind in [WorkloadKind::Secrets, WorkloadKind::Config] {
            let specs = field_specs(kind);
            assert_eq!(specs.len(), 1);
            assert_eq!(specs[0].path, "data");
            assert!(specs[0].required);
            assert!(specs[0].default.is_none());
        }
    }

    #[test]
    fn job_has_no_replicas() {
        let specs = field_specs(WorkloadKind::Job);
        assert!(specs.iter().all(|s| s.path != "replicas"));
        assert!(specs.iter().any(|s| s.path == "backoffLimit"));
    }
}
