//! Output publication
//!
//! Computes the instance's published surface from its publish declarations
//! and resolved values, then writes it out whole. Publication always
//! overwrites: the status outputs map and the connection secret are replaced
//! with exactly the computed set, so keys removed from the declarations
//! disappear from the published surface on the next pass.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use strata_common::crd::{PublishSpec, WorkloadKind};
use strata_common::{connection_secret_name, Error, Result};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::context::ReconciliationContext;
use crate::k8s::Secret;
use crate::merge::lookup_path;

/// The computed published surface of one instance
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedSet {
    /// Non-sensitive outputs, visible to cross-instance `outputs/` references
    pub outputs: BTreeMap<String, String>,
    /// The connection secret carrying every published value, sensitive ones
    /// included
    pub connection: Secret,
}

/// Destination for an instance's published surface.
///
/// The Kubernetes-backed implementation lives in the operator crate; tests
/// mock this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Replace the instance's status outputs map with exactly this set
    async fn replace_outputs(
        &self,
        namespace: &str,
        name: &str,
        outputs: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Server-side apply the connection secret
    async fn apply_connection_secret(&self, secret: &Secret) -> Result<()>;
}

/// Compute the published surface from declarations and resolved values.
///
/// Service instances publish implicit `host` and `port` outputs derived from
/// their in-cluster DNS name; explicit declarations with the same key win.
/// A declaration whose source path resolves to nothing is an error.
pub fn compute(
    ctx: &ReconciliationContext,
    resolved: &BTreeMap<String, Value>,
    publish: &[PublishSpec],
) -> Result<PublishedSet> {
    let mut outputs = BTreeMap::new();
    let mut sensitive = BTreeMap::new();

    if ctx.kind == WorkloadKind::Service {
        outputs.insert(
            "host".to_string(),
            format!(
                "{}.{}.svc.{}",
                ctx.name, ctx.namespace, ctx.cluster.environment.domain
            ),
        );
        if let Some(port) = resolved.get("port").and_then(Value::as_i64) {
            outputs.insert("port".to_string(), port.to_string());
        }
    }

    for spec in publish {
        let value = lookup_path(resolved, &spec.from)
            .ok_or_else(|| Error::missing_required(&spec.from))?;
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if spec.sensitive {
            // Sensitive values never land in status, only in the secret
            outputs.remove(&spec.key);
            sensitive.insert(spec.key.clone(), value);
        } else {
            sensitive.remove(&spec.key);
            outputs.insert(spec.key.clone(), value);
        }
    }

    let mut connection = Secret::new(connection_secret_name(&ctx.name), &ctx.namespace);
    connection.string_data = outputs.clone();
    connection.string_data.extend(sensitive);

    Ok(PublishedSet {
        outputs,
        connection,
    })
}

/// Write the computed surface out through the sink.
///
/// Both legs always run, even when the set is empty: overwriting with an
/// empty set is how retracted outputs disappear.
pub async fn publish(
    ctx: &ReconciliationContext,
    sink: &dyn OutputSink,
    set: &PublishedSet,
) -> Result<()> {
    sink.replace_outputs(&ctx.namespace, &ctx.name, &set.outputs)
        .await?;
    sink.apply_connection_secret(&set.connection).await?;
    debug!(
        name = %ctx.name,
        namespace = %ctx.namespace,
        outputs = set.outputs.len(),
        "outputs published"
    );
    Ok(())
}
