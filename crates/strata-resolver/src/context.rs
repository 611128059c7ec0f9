//! Per-pass reconciliation context
//!
//! Everything a single reconciliation needs travels in one
//! [`ReconciliationContext`] passed through the pipeline: the instance's
//! identity and spec values, the loaded config tiers, and the
//! target-instance lookup cache. The context is built fresh at the start of
//! each pass and dropped at its end, so nothing leaks between passes and
//! concurrent reconciliations of different instances never share state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use strata_common::crd::{StrataClusterConfigSpec, StrataProjectConfigSpec, WorkloadKind};
use strata_common::Result;
use tokio::sync::Mutex;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::config::LoadedConfig;

/// The published surface of a target instance, as seen by a reference
#[derive(Clone, Debug, PartialEq)]
pub struct TargetInstance {
    /// The target's workload kind
    pub kind: WorkloadKind,
    /// The target's published-outputs map
    pub outputs: BTreeMap<String, String>,
    /// The target's deterministic connection-secret name
    pub connection_secret: String,
}

/// Lookup of target instances by `(namespace, name)`.
///
/// Absence is a normal outcome, not an error: the target may simply not have
/// been created yet. The Kubernetes-backed implementation lives in the
/// operator crate; tests mock this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstanceLookup: Send + Sync {
    /// Fetch a target instance's published surface; `None` when absent
    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Option<TargetInstance>>;
}

/// Context for one reconciliation pass
pub struct ReconciliationContext {
    /// Name of the instance being reconciled
    pub name: String,
    /// Namespace of the instance being reconciled
    pub namespace: String,
    /// Workload kind of the instance
    pub kind: WorkloadKind,
    /// The instance's own spec values (merge level 3)
    pub values: BTreeMap<String, Value>,
    /// The environment's cluster config
    pub cluster: StrataClusterConfigSpec,
    /// The project's override config, if any
    pub project: Option<StrataProjectConfigSpec>,
    // Target lookups already performed this pass, misses included. The lock
    // is held across the fetch so a target is looked up at most once.
    cache: Mutex<HashMap<(String, String), Option<Arc<TargetInstance>>>>,
}

impl ReconciliationContext {
    /// Build the context for one pass from the instance and loaded config
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        kind: WorkloadKind,
        values: BTreeMap<String, Value>,
        config: LoadedConfig,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind,
            values,
            cluster: config.cluster,
            project: config.project,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Cached target lookup.
    ///
    /// Repeated references to the same `(namespace, name)` within one pass
    /// incur exactly one external lookup; misses are cached too, so a pass
    /// observes one consistent view of a target's absence.
    pub async fn lookup(
        &self,
        lookup: &dyn InstanceLookup,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Arc<TargetInstance>>> {
        let key = (namespace.to_string(), name.to_string());
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(&key) {
            trace!(namespace, name, "target lookup cache hit");
            return Ok(cached.clone());
        }
        let fetched = lookup.get_instance(namespace, name).await?.map(Arc::new);
        cache.insert(key, fetched.clone());
        Ok(fetched)
    }

    /// Raw env entries from the instance's own spec values.
    ///
    /// Reference parsing operates on these level-3 strings, not on merged
    /// values, which keeps the value and reference legs of the pipeline free
    /// of data dependency.
    pub fn raw_env(&self) -> BTreeMap<String, String> {
        let Some(Value::Object(env)) = self.values.get("env") else {
            return BTreeMap::new();
        };
        env.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }
}
