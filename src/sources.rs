//! Kubernetes-backed implementations of the pipeline's seams
//!
//! The resolver crate talks to the cluster only through traits; this module
//! supplies the real implementations. All writes use server-side apply with
//! a forced field manager, so repeated application of unchanged resources
//! converges without conflicts.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use serde_json::json;
use strata_common::crd::{
    InstancePhase, StrataClusterConfig, StrataProjectConfig, WorkloadInstance,
    WorkloadInstanceStatus,
};
use strata_common::{connection_secret_name, Error, Result, SYSTEM_NAMESPACE};
use strata_resolver::config::{cluster_selector, project_selector, ConfigSource};
use strata_resolver::context::{InstanceLookup, TargetInstance};
use strata_resolver::k8s::Secret as GeneratedSecret;
use strata_resolver::outputs::OutputSink;
use strata_resolver::patch::GeneratedResources;
use tracing::debug;

use crate::controller::{ResourceSink, StatusWriter};

/// Field manager for controller-owned resources
const FIELD_MANAGER: &str = "strata-controller";

/// Field manager for the published-outputs status leg. Separate from
/// [`FIELD_MANAGER`] so applying outputs alone removes stale keys without
/// disturbing the rest of the status.
const OUTPUTS_MANAGER: &str = "strata-outputs";

/// Deadline for config tier queries and target-instance lookups
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Config tiers
// =============================================================================

/// Config tiers read from the system namespace
pub struct KubeConfigSource {
    client: Client,
}

impl KubeConfigSource {
    /// Create a source backed by the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigSource for KubeConfigSource {
    async fn list_cluster_configs(&self) -> Result<Vec<StrataClusterConfig>> {
        let api: Api<StrataClusterConfig> =
            Api::namespaced(self.client.clone(), SYSTEM_NAMESPACE);
        let params = ListParams::default().labels(&cluster_selector());
        let list = tokio::time::timeout(LOOKUP_TIMEOUT, api.list(&params))
            .await
            .map_err(|_| Error::timeout("cluster config query"))??;
        Ok(list.items)
    }

    async fn list_project_configs(&self, project: &str) -> Result<Vec<StrataProjectConfig>> {
        let api: Api<StrataProjectConfig> =
            Api::namespaced(self.client.clone(), SYSTEM_NAMESPACE);
        let params = ListParams::default().labels(&project_selector(project));
        let list = tokio::time::timeout(LOOKUP_TIMEOUT, api.list(&params))
            .await
            .map_err(|_| Error::timeout("project config query"))??;
        Ok(list.items)
    }
}

// =============================================================================
// Target instance lookup
// =============================================================================

/// Target-instance lookup against the live cluster
pub struct KubeInstanceLookup {
    client: Client,
}

impl KubeInstanceLookup {
    /// Create a lookup backed by the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstanceLookup for KubeInstanceLookup {
    async fn get_instance(&self, namespace: &str, name: &str) -> Result<Option<TargetInstance>> {
        let api: Api<WorkloadInstance> = Api::namespaced(self.client.clone(), namespace);
        let Some(found) = tokio::time::timeout(LOOKUP_TIMEOUT, api.get_opt(name))
            .await
            .map_err(|_| Error::timeout("target instance lookup"))??
        else {
            debug!(namespace, name, "target instance not found");
            return Ok(None);
        };
        Ok(Some(TargetInstance {
            kind: found.spec.kind,
            outputs: found.status.map(|s| s.outputs).unwrap_or_default(),
            connection_secret: connection_secret_name(name),
        }))
    }
}

// =============================================================================
// Output publication
// =============================================================================

/// Output sink writing status outputs and connection secrets
pub struct KubeOutputSink {
    client: Client,
}

impl KubeOutputSink {
    /// Create a sink backed by the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutputSink for KubeOutputSink {
    async fn replace_outputs(
        &self,
        namespace: &str,
        name: &str,
        outputs: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<WorkloadInstance> = Api::namespaced(self.client.clone(), namespace);
        // Apply with a dedicated manager: keys absent from this set fall out
        // of the status instead of lingering from earlier passes.
        let patch = json!({
            "apiVersion": strata_common::API_VERSION,
            "kind": "WorkloadInstance",
            "status": { "outputs": outputs }
        });
        let params = PatchParams::apply(OUTPUTS_MANAGER).force();
        api.patch_status(name, &params, &Patch::Apply(&patch)).await?;
        Ok(())
    }

    async fn apply_connection_secret(&self, secret: &GeneratedSecret) -> Result<()> {
        let api: Api<k8s_openapi::api::core::v1::Secret> =
            Api::namespaced(self.client.clone(), &secret.metadata.namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&secret.metadata.name, &params, &Patch::Apply(secret))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Generated resource application
// =============================================================================

/// Resource sink applying generated resources to the cluster
pub struct KubeResourceSink {
    client: Client,
}

impl KubeResourceSink {
    /// Create a sink backed by the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceSink for KubeResourceSink {
    async fn apply(&self, namespace: &str, resources: &GeneratedResources) -> Result<()> {
        let params = PatchParams::apply(FIELD_MANAGER).force();

        if let Some(workload) = &resources.workload {
            let (group, version) = workload
                .api_version
                .split_once('/')
                .unwrap_or(("", workload.api_version.as_str()));
            let gvk = GroupVersionKind::gvk(group, version, &workload.kind);
            let ar = ApiResource::from_gvk(&gvk);
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), namespace, &ar);
            api.patch(&workload.metadata.name, &params, &Patch::Apply(workload))
                .await?;
            debug!(
                name = %workload.metadata.name,
                kind = %workload.kind,
                "workload applied"
            );
        }

        for cm in &resources.config_maps {
            let api: Api<k8s_openapi::api::core::v1::ConfigMap> =
                Api::namespaced(self.client.clone(), namespace);
            api.patch(&cm.metadata.name, &params, &Patch::Apply(cm))
                .await?;
        }

        for secret in &resources.secrets {
            let api: Api<k8s_openapi::api::core::v1::Secret> =
                Api::namespaced(self.client.clone(), namespace);
            api.patch(&secret.metadata.name, &params, &Patch::Apply(secret))
                .await?;
        }

        Ok(())
    }
}

// =============================================================================
// Status updates
// =============================================================================

/// Status writer patching the instance's status subresource
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    /// Create a writer backed by the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn set_phase(&self, namespace: &str, name: &str, phase: InstancePhase) -> Result<()> {
        let api: Api<WorkloadInstance> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": { "phase": phase } });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkloadInstanceStatus,
    ) -> Result<()> {
        let api: Api<WorkloadInstance> = Api::namespaced(self.client.clone(), namespace);
        // Outputs are owned by the output sink's apply leg; this patch only
        // carries the pass outcome.
        let patch = json!({
            "status": {
                "phase": status.phase,
                "conditions": status.conditions,
                "observedGeneration": status.observed_generation,
            }
        });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
