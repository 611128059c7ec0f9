//! The 4-level precedence merge for workload field values
//!
//! Precedence, lowest to highest: composition default < cluster default <
//! instance spec value < per-project override. The merge dispatches on the
//! override's type: scalars and arrays fully replace, maps deep-merge.
//!
//! Two distinct null rules, deliberately not unified:
//! - a null (or absent) value at the *top* of a merge level skips that level
//!   and keeps whatever lower levels produced;
//! - a null nested *inside* a map override deletes that key from the
//!   accumulated map.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use strata_common::crd::{StrataClusterConfigSpec, StrataProjectConfigSpec, WorkloadKind};
use strata_common::{Error, Result};
use tracing::trace;

use crate::composition::{field_specs, FieldSpec};

/// Merge an override into an accumulated value.
///
/// Maps deep-merge (with null-deletes-key); everything else, arrays
/// included, fully replaces the accumulated value.
pub fn merge_value(base: Option<Value>, over: &Value) -> Value {
    match (base, over) {
        (Some(Value::Object(base_map)), Value::Object(over_map)) => {
            Value::Object(deep_merge(base_map, over_map))
        }
        (_, other) => other.clone(),
    }
}

/// Deep-merge one map into another.
///
/// Keys present in either side are kept; non-map conflicts take the
/// override's value; map-map conflicts recurse; a null override value
/// deletes the key (explicit removal, not "absent").
fn deep_merge(mut base: Map<String, Value>, over: &Map<String, Value>) -> Map<String, Value> {
    for (key, over_value) in over {
        if over_value.is_null() {
            base.remove(key);
            continue;
        }
        match (base.remove(key), over_value) {
            (Some(Value::Object(base_inner)), Value::Object(over_inner)) => {
                base.insert(
                    key.clone(),
                    Value::Object(deep_merge(base_inner, over_inner)),
                );
            }
            (_, v) => {
                base.insert(key.clone(), v.clone());
            }
        }
    }
    base
}

/// Apply one merge level: a present, non-null value merges in; an absent or
/// explicitly null value skips the level without erasing lower levels.
fn apply_level(acc: Option<Value>, level: Option<&Value>) -> Option<Value> {
    match level {
        Some(v) if !v.is_null() => Some(merge_value(acc, v)),
        _ => acc,
    }
}

/// Resolve a single declared field through all four levels.
pub fn resolve_field(
    spec: &FieldSpec,
    cluster_defaults: Option<&BTreeMap<String, Value>>,
    instance_values: &BTreeMap<String, Value>,
    project_overrides: Option<&BTreeMap<String, Value>>,
) -> Result<Option<Value>> {
    let mut acc = spec.default.clone();
    acc = apply_level(acc, cluster_defaults.and_then(|d| d.get(spec.path)));
    acc = apply_level(acc, instance_values.get(spec.path));
    acc = apply_level(acc, project_overrides.and_then(|o| o.get(spec.path)));

    if acc.is_none() && spec.required {
        return Err(Error::missing_required(spec.path));
    }
    trace!(field = spec.path, resolved = ?acc, "field resolved");
    Ok(acc)
}

/// Resolve every field the kind's patch stage declares.
///
/// Fails fast on the first missing required field: no partial result is
/// returned and the whole resource generation for the instance aborts.
pub fn resolve_all(
    kind: WorkloadKind,
    instance_name: &str,
    instance_values: &BTreeMap<String, Value>,
    cluster: &StrataClusterConfigSpec,
    project: Option<&StrataProjectConfigSpec>,
) -> Result<BTreeMap<String, Value>> {
    let kind_key = kind.to_string();
    let cluster_defaults = cluster.defaults_for(&kind_key);
    let project_overrides = project.and_then(|p| p.overrides_for(instance_name));

    let mut resolved = BTreeMap::new();
    for spec in field_specs(kind) {
        if let Some(value) =
            resolve_field(&spec, cluster_defaults, instance_values, project_overrides)?
        {
            resolved.insert(spec.path.to_string(), value);
        }
    }
    Ok(resolved)
}

/// Walk a dotted path (`env.DB_HOST`, `resources.cpu`) into a resolved map.
pub fn lookup_path<'a>(values: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = values.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster_with(kind: &str, defaults: Value) -> StrataClusterConfigSpec {
        let table: BTreeMap<String, Value> =
            serde_json::from_value(defaults).expect("defaults table");
        let mut by_kind = BTreeMap::new();
        by_kind.insert(kind.to_string(), table);
        StrataClusterConfigSpec {
            environment: Default::default(),
            defaults: by_kind,
        }
    }

    fn project_with(instance: &str, overrides: Value) -> StrataProjectConfigSpec {
        let table: BTreeMap<String, Value> =
            serde_json::from_value(overrides).expect("overrides table");
        let mut by_instance = BTreeMap::new();
        by_instance.insert(instance.to_string(), table);
        StrataProjectConfigSpec {
            project: "team-a".to_string(),
            overrides: by_instance,
        }
    }

    fn values(v: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(v).expect("values map")
    }

    // ==========================================================================
    // Precedence chain
    // ==========================================================================

    /// composition 1 < cluster 3 < spec 5 < override 10
    #[test]
    fn precedence_override_always_wins() {
        let cluster = cluster_with("service", json!({ "replicas": 3 }));
        let project = project_with("api", json!({ "replicas": 10 }));
        let spec_values = values(json!({ "image": "img", "replicas": 5 }));

        let resolved = resolve_all(
            WorkloadKind::Service,
            "api",
            &spec_values,
            &cluster,
            Some(&project),
        )
        .expect("resolve");
        assert_eq!(resolved.get("replicas"), Some(&json!(10)));
    }

    #[test]
    fn fallback_chain_peels_level_by_level() {
        let cluster = cluster_with("service", json!({ "replicas": 3 }));
        let project = project_with("api", json!({ "replicas": 10 }));
        let spec_with = values(json!({ "image": "img", "replicas": 5 }));
        let spec_without = values(json!({ "image": "img" }));

        // All four levels -> override wins
        let r = resolve_all(WorkloadKind::Service, "api", &spec_with, &cluster, Some(&project))
            .unwrap();
        assert_eq!(r.get("replicas"), Some(&json!(10)));

        // Remove override -> spec value
        let r = resolve_all(WorkloadKind::Service, "api", &spec_with, &cluster, None).unwrap();
        assert_eq!(r.get("replicas"), Some(&json!(5)));

        // Remove spec value -> cluster default
        let r = resolve_all(WorkloadKind::Service, "api", &spec_without, &cluster, None).unwrap();
        assert_eq!(r.get("replicas"), Some(&json!(3)));

        // Remove cluster default -> composition default
        let empty_cluster = cluster_with("service", json!({}));
        let r = resolve_all(WorkloadKind::Service, "api", &spec_without, &empty_cluster, None)
            .unwrap();
        assert_eq!(r.get("replicas"), Some(&json!(1)));
    }

    #[test]
    fn missing_required_field_fails_the_whole_resolution() {
        // `image` has no composition default and nothing supplies it
        let cluster = cluster_with("service", json!({}));
        let spec_values = values(json!({ "replicas": 2 }));

        let err = resolve_all(WorkloadKind::Service, "api", &spec_values, &cluster, None)
            .expect_err("must fail");
        match err {
            Error::MissingRequiredValue { field } => assert_eq!(field, "image"),
            other => panic!("expected MissingRequiredValue, got {other:?}"),
        }
    }

    // ==========================================================================
    // Merge dispatch
    // ==========================================================================

    #[test]
    fn scalars_fully_replace() {
        assert_eq!(merge_value(Some(json!(3)), &json!(10)), json!(10));
        assert_eq!(merge_value(Some(json!("a")), &json!("b")), json!("b"));
        assert_eq!(merge_value(Some(json!({"k": 1})), &json!("flat")), json!("flat"));
    }

    #[test]
    fn arrays_fully_replace_never_union() {
        let base = json!(["a", "b", "c"]);
        let over = json!(["x"]);
        assert_eq!(merge_value(Some(base), &over), json!(["x"]));

        // Array onto map also replaces
        assert_eq!(
            merge_value(Some(json!({"k": 1})), &json!([1, 2])),
            json!([1, 2])
        );
    }

    #[test]
    fn maps_deep_merge_keeping_both_sides() {
        let base = json!({ "cpu": "100m", "memory": "128Mi" });
        let over = json!({ "cpu": "250m", "gpu": "1" });
        assert_eq!(
            merge_value(Some(base), &over),
            json!({ "cpu": "250m", "memory": "128Mi", "gpu": "1" })
        );
    }

    #[test]
    fn nested_maps_recurse() {
        let base = json!({ "limits": { "cpu": "1", "memory": "1Gi" }, "class": "standard" });
        let over = json!({ "limits": { "cpu": "2" } });
        assert_eq!(
            merge_value(Some(base), &over),
            json!({ "limits": { "cpu": "2", "memory": "1Gi" }, "class": "standard" })
        );
    }

    #[test]
    fn null_inside_map_deletes_the_key() {
        let base = json!({ "cpu": "100m", "memory": "128Mi" });
        let over = json!({ "memory": null });
        assert_eq!(merge_value(Some(base), &over), json!({ "cpu": "100m" }));
    }

    #[test]
    fn null_deletion_wins_over_all_lower_levels() {
        // `memory` present at composition and cluster levels, deleted by the
        // project override's nested null.
        let cluster = cluster_with(
            "service",
            json!({ "resources": { "cpu": "250m", "memory": "512Mi" } }),
        );
        let project = project_with("api", json!({ "resources": { "memory": null } }));
        let spec_values = values(json!({ "image": "img" }));

        let r = resolve_all(WorkloadKind::Service, "api", &spec_values, &cluster, Some(&project))
            .unwrap();
        assert_eq!(r.get("resources"), Some(&json!({ "cpu": "250m" })));
    }

    #[test]
    fn merge_is_idempotent() {
        let base = json!({ "a": { "b": 1 }, "c": [1, 2] });
        let over = json!({ "a": { "b": 2, "d": null }, "c": [3] });
        let once = merge_value(Some(base), &over);
        let twice = merge_value(Some(once.clone()), &over);
        assert_eq!(once, twice);
    }

    // ==========================================================================
    // Level-skip rules
    // ==========================================================================

    #[test]
    fn null_spec_value_skips_to_lower_level() {
        // Explicit null at the top of level 3 skips, it does not erase
        let cluster = cluster_with("service", json!({ "replicas": 3 }));
        let spec_values = values(json!({ "image": "img", "replicas": null }));

        let r = resolve_all(WorkloadKind::Service, "api", &spec_values, &cluster, None).unwrap();
        assert_eq!(r.get("replicas"), Some(&json!(3)));
    }

    #[test]
    fn absent_and_null_top_level_behave_identically() {
        let cluster = cluster_with("service", json!({ "replicas": 3 }));
        let with_null = values(json!({ "image": "img", "replicas": null }));
        let without = values(json!({ "image": "img" }));

        let a = resolve_all(WorkloadKind::Service, "api", &with_null, &cluster, None).unwrap();
        let b = resolve_all(WorkloadKind::Service, "api", &without, &cluster, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn optional_field_with_no_value_is_simply_absent() {
        let cluster = cluster_with("service", json!({}));
        let spec_values = values(json!({ "image": "img" }));
        let r = resolve_all(WorkloadKind::Service, "api", &spec_values, &cluster, None).unwrap();
        assert!(!r.contains_key("labels"));
    }

    // ==========================================================================
    // Path lookup
    // ==========================================================================

    #[test]
    fn lookup_path_walks_nested_maps() {
        let resolved = values(json!({
            "port": 8080,
            "env": { "DB_NAME": "app" },
            "resources": { "limits": { "cpu": "1" } }
        }));
        assert_eq!(lookup_path(&resolved, "port"), Some(&json!(8080)));
        assert_eq!(lookup_path(&resolved, "env.DB_NAME"), Some(&json!("app")));
        assert_eq!(
            lookup_path(&resolved, "resources.limits.cpu"),
            Some(&json!("1"))
        );
        assert_eq!(lookup_path(&resolved, "env.MISSING"), None);
        assert_eq!(lookup_path(&resolved, "port.deeper"), None);
    }
}
