//! Deterministic resource generation
//!
//! Turns one instance's resolved values and resolved references into the
//! Kubernetes resources the pass applies. Generation runs the same fixed
//! stages every time:
//!
//! 1. skeleton for the workload kind
//! 2. resolved values (image, scale, ports, literal env)
//! 3. reference injections (literals and secret/config pointers)
//! 4. metadata (management labels, ownership, config hash)
//!
//! The stages are pure functions of their inputs. Applying the output twice
//! converges: identical inputs produce byte-identical resources, so the
//! second server-side apply is a no-op.

use std::collections::BTreeMap;

use aws_lc_rs::digest::{digest, SHA256};
use serde_json::Value;
use strata_common::crd::WorkloadKind;
use strata_common::{Error, Result, ANNOTATION_CONFIG_HASH};
use tracing::debug;

use crate::k8s::{
    ConfigMap, Container, ContainerPort, EnvFromSource, EnvVar, LabelSelector, ObjectMeta,
    OwnerReference, PodSpec, PodTemplateSpec, Secret, TemplateMeta, Workload,
    WorkloadResourceSpec,
};
use crate::resolve::ResolvedReference;

/// Everything one pass generates for an instance
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedResources {
    /// The workload resource, absent for bundle kinds
    pub workload: Option<Workload>,
    /// Generated config maps (bundle kinds)
    pub config_maps: Vec<ConfigMap>,
    /// Generated secrets (bundle kinds)
    pub secrets: Vec<Secret>,
}

/// Identity of the instance being generated for
#[derive(Clone, Debug)]
pub struct GenerateTarget<'a> {
    /// Instance name
    pub name: &'a str,
    /// Instance namespace
    pub namespace: &'a str,
    /// Workload kind
    pub kind: WorkloadKind,
    /// UID of the instance, when known, for ownership linkage
    pub uid: Option<&'a str>,
}

/// Generate the full resource set for an instance.
///
/// `resolved` is the merged values map; `references` are the already-resolved
/// env references, which take precedence over same-named merged env entries.
pub fn generate(
    target: &GenerateTarget<'_>,
    resolved: &BTreeMap<String, Value>,
    references: &BTreeMap<String, ResolvedReference>,
) -> Result<GeneratedResources> {
    let generated = match target.kind {
        WorkloadKind::Service | WorkloadKind::Worker | WorkloadKind::Job => {
            let workload = generate_workload(target, resolved, references)?;
            GeneratedResources {
                workload: Some(workload),
                ..Default::default()
            }
        }
        WorkloadKind::Secrets => GeneratedResources {
            secrets: generate_bundle(
                target,
                resolved,
                |name, ns| Secret::new(name, ns),
                |secret, data| {
                    secret.string_data = data;
                },
            )?,
            ..Default::default()
        },
        WorkloadKind::Config => GeneratedResources {
            config_maps: generate_bundle(
                target,
                resolved,
                |name, ns| ConfigMap::new(name, ns),
                |cm, data| {
                    cm.data = data;
                },
            )?,
            ..Default::default()
        },
    };
    debug!(
        name = target.name,
        namespace = target.namespace,
        kind = %target.kind,
        "resources generated"
    );
    Ok(generated)
}

// =============================================================================
// Workload kinds (Service / Worker / Job)
// =============================================================================

fn generate_workload(
    target: &GenerateTarget<'_>,
    resolved: &BTreeMap<String, Value>,
    references: &BTreeMap<String, ResolvedReference>,
) -> Result<Workload> {
    let image = require_str(resolved, "image")?;
    let (env, env_from) = build_env(resolved, references)?;
    let hash = config_hash(&env, &env_from)?;

    let mut container = Container {
        name: target.name.to_string(),
        image,
        env,
        env_from,
        ports: Vec::new(),
        resources: resolved.get("resources").cloned(),
    };
    if target.kind == WorkloadKind::Service {
        container.ports = vec![ContainerPort {
            container_port: require_i64(resolved, "port")?,
        }];
    }

    let mut metadata = metadata_for(target);
    let mut pod_labels = metadata.labels.clone();
    if let Some(Value::Object(labels)) = resolved.get("labels") {
        for (k, v) in labels {
            if let Some(s) = v.as_str() {
                metadata.labels.insert(k.clone(), s.to_string());
                pod_labels.insert(k.clone(), s.to_string());
            }
        }
    }

    let template = PodTemplateSpec {
        metadata: TemplateMeta {
            labels: pod_labels,
            annotations: BTreeMap::from([(ANNOTATION_CONFIG_HASH.to_string(), hash)]),
        },
        spec: PodSpec {
            containers: vec![container],
        },
    };

    let spec = match target.kind {
        WorkloadKind::Job => WorkloadResourceSpec {
            replicas: None,
            backoff_limit: Some(require_i64(resolved, "backoffLimit")?),
            selector: None,
            template,
        },
        _ => WorkloadResourceSpec {
            replicas: Some(require_i64(resolved, "replicas")?),
            backoff_limit: None,
            selector: Some(LabelSelector {
                match_labels: BTreeMap::from([(
                    strata_common::LABEL_NAME.to_string(),
                    target.name.to_string(),
                )]),
            }),
            template,
        },
    };

    let (api_version, resource_kind) = match target.kind {
        WorkloadKind::Job => ("batch/v1", "Job"),
        _ => ("apps/v1", "Deployment"),
    };

    Ok(Workload {
        api_version: api_version.to_string(),
        kind: resource_kind.to_string(),
        metadata,
        spec,
    })
}

/// Merge literal env entries with resolved references into the container's
/// env lists. A resolved reference wins over a same-named merged literal.
fn build_env(
    resolved: &BTreeMap<String, Value>,
    references: &BTreeMap<String, ResolvedReference>,
) -> Result<(Vec<EnvVar>, Vec<EnvFromSource>)> {
    let mut vars: BTreeMap<String, EnvVar> = BTreeMap::new();
    let mut env_from = Vec::new();

    if let Some(Value::Object(env)) = resolved.get("env") {
        for (name, value) in env {
            if references.contains_key(name) {
                continue;
            }
            vars.insert(name.clone(), EnvVar::literal(name, value_to_string(value)));
        }
    }

    for (name, reference) in references {
        match reference {
            ResolvedReference::Literal(value) => {
                vars.insert(name.clone(), EnvVar::literal(name, value));
            }
            ResolvedReference::SecretPointer {
                name: secret,
                key: Some(key),
            } => {
                vars.insert(name.clone(), EnvVar::from_secret(name, secret, key));
            }
            ResolvedReference::SecretPointer { name: secret, key: None } => {
                env_from.push(EnvFromSource::secret(secret));
            }
            ResolvedReference::ConfigPointer {
                name: config,
                key: Some(key),
            } => {
                vars.insert(name.clone(), EnvVar::from_config_map(name, config, key));
            }
            ResolvedReference::ConfigPointer { name: config, key: None } => {
                env_from.push(EnvFromSource::config_map(config));
            }
        }
    }

    Ok((vars.into_values().collect(), env_from))
}

// =============================================================================
// Bundle kinds (Secrets / Config)
// =============================================================================

/// One resource per entry of the bundle's `data` table, named
/// `<instance>-<resource>` so pointer references line up by construction.
fn generate_bundle<R>(
    target: &GenerateTarget<'_>,
    resolved: &BTreeMap<String, Value>,
    new: impl Fn(String, &str) -> R,
    set_data: impl Fn(&mut R, BTreeMap<String, String>),
) -> Result<Vec<R>> {
    let Some(Value::Object(data)) = resolved.get("data") else {
        return Err(Error::serialization(
            "bundle 'data' must be a map of resource name to key/value table",
        ));
    };

    let mut resources = Vec::new();
    for (resource, table) in data {
        let Value::Object(entries) = table else {
            return Err(Error::serialization(format!(
                "bundle resource '{resource}' must be a key/value table"
            )));
        };
        let mut out = new(format!("{}-{resource}", target.name), target.namespace);
        set_data(
            &mut out,
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
        );
        resources.push(out);
    }
    Ok(resources)
}

// =============================================================================
// Helpers
// =============================================================================

fn metadata_for(target: &GenerateTarget<'_>) -> ObjectMeta {
    let mut metadata = ObjectMeta::new(target.name, target.namespace);
    if let Some(uid) = target.uid {
        metadata.owner_references = vec![OwnerReference::instance(target.name, uid)];
    }
    metadata
}

/// Short content hash over the final env configuration. Stamped on the pod
/// template so any effective config change rolls the pods.
fn config_hash(env: &[EnvVar], env_from: &[EnvFromSource]) -> Result<String> {
    let payload =
        serde_json::to_vec(&(env, env_from)).map_err(|e| Error::serialization(e.to_string()))?;
    let hash = digest(&SHA256, &payload);
    Ok(hash.as_ref()[..8].iter().map(|b| format!("{b:02x}")).collect())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn require_str(resolved: &BTreeMap<String, Value>, field: &str) -> Result<String> {
    resolved
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::missing_required(field))
}

fn require_i64(resolved: &BTreeMap<String, Value>, field: &str) -> Result<i64> {
    resolved
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::missing_required(field))
}
