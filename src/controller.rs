//! WorkloadInstance reconciliation
//!
//! One reconciliation pass walks a fixed sequence: load the config tiers,
//! resolve values and references (the two legs share no data and run
//! concurrently), generate and apply the resource set, publish outputs, then
//! record the result on the instance's status. Every stage is fallible and a
//! failure anywhere aborts the pass; the error's retryability decides whether
//! the controller backs off or waits for a spec change.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use strata_common::crd::{
    Condition, ConditionStatus, InstancePhase, WorkloadInstance, WorkloadInstanceStatus,
};
use strata_common::{Error, Result};
use strata_resolver::config::ConfigSource;
use strata_resolver::context::{InstanceLookup, ReconciliationContext};
use strata_resolver::outputs::{self, OutputSink};
use strata_resolver::patch::{self, GenerateTarget, GeneratedResources};
use strata_resolver::{merge, resolve};
use tracing::{error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

/// Condition type recorded on every completed pass
pub const CONDITION_RESOLVED: &str = "Resolved";

// =============================================================================
// Seams to the cluster
// =============================================================================

/// Destination for the generated resource set.
///
/// Application uses server-side apply throughout, so re-applying an
/// unchanged set is a no-op on the cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceSink: Send + Sync {
    /// Apply every resource in the set to the given namespace
    async fn apply(&self, namespace: &str, resources: &GeneratedResources) -> Result<()>;
}

/// Writer for instance status updates
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Record the stage the pass has reached
    async fn set_phase(&self, namespace: &str, name: &str, phase: InstancePhase) -> Result<()>;

    /// Record the outcome of a completed pass
    async fn update(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkloadInstanceStatus,
    ) -> Result<()>;
}

/// Shared controller context
pub struct Context {
    /// Source of the two config tiers
    pub config_source: Arc<dyn ConfigSource>,
    /// Target-instance lookup for reference resolution
    pub lookup: Arc<dyn InstanceLookup>,
    /// Destination for generated resources
    pub resources: Arc<dyn ResourceSink>,
    /// Destination for published outputs
    pub outputs: Arc<dyn OutputSink>,
    /// Status writer for the reconciled instance
    pub status: Arc<dyn StatusWriter>,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile a WorkloadInstance.
///
/// Called whenever an instance is created, updated, or resynced. Runs one
/// full resolution pass and records the outcome on the instance's status.
#[instrument(skip(instance, ctx), fields(instance = %instance.name_any()))]
pub async fn reconcile(
    instance: Arc<WorkloadInstance>,
    ctx: Arc<Context>,
) -> std::result::Result<Action, Error> {
    let name = instance.name_any();
    let namespace = match instance.metadata.namespace.as_deref() {
        Some(ns) => ns,
        None => {
            warn!("instance has no namespace, ignoring");
            return Ok(Action::await_change());
        }
    };
    info!("reconciling instance");

    match run_pass(&instance, &name, namespace, &ctx).await {
        Ok(published) => {
            let status = WorkloadInstanceStatus {
                phase: InstancePhase::Ready,
                conditions: vec![Condition::new(
                    CONDITION_RESOLVED,
                    ConditionStatus::True,
                    "ReconcileSucceeded",
                    "all values and references resolved",
                )],
                outputs: published,
                observed_generation: instance.metadata.generation,
            };
            ctx.status.update(namespace, &name, &status).await?;
            info!("instance ready");
            Ok(Action::requeue(Duration::from_secs(60)))
        }
        Err(e) => {
            warn!(error = %e, retryable = e.is_retryable(), "reconciliation pass failed");
            let status = WorkloadInstanceStatus {
                phase: InstancePhase::Failed,
                conditions: vec![Condition::new(
                    CONDITION_RESOLVED,
                    ConditionStatus::False,
                    e.code(),
                    e.to_string(),
                )],
                // Previously published outputs stay visible while failed
                outputs: instance
                    .status
                    .as_ref()
                    .map(|s| s.outputs.clone())
                    .unwrap_or_default(),
                observed_generation: instance.metadata.generation,
            };
            if let Err(status_err) = ctx.status.update(namespace, &name, &status).await {
                error!(error = %status_err, "failed to record failure status");
            }
            Err(e)
        }
    }
}

/// The resolution pipeline for one instance. Returns the published outputs
/// for the final status.
async fn run_pass(
    instance: &WorkloadInstance,
    name: &str,
    namespace: &str,
    ctx: &Context,
) -> Result<BTreeMap<String, String>> {
    ctx.status
        .set_phase(namespace, name, InstancePhase::LoadingConfig)
        .await?;
    // The project tier is keyed by the instance's namespace
    let loaded = strata_resolver::config::load(ctx.config_source.as_ref(), namespace).await?;

    ctx.status
        .set_phase(namespace, name, InstancePhase::Resolving)
        .await?;
    let kind = instance.spec.kind;
    let rctx = ReconciliationContext::new(
        name,
        namespace,
        kind,
        instance.spec.values.clone(),
        loaded,
    );
    // The value leg merges declared fields; the reference leg resolves the
    // instance's own env references. Neither reads the other's result.
    let (resolved, references) = tokio::try_join!(
        async { merge::resolve_all(kind, name, &rctx.values, &rctx.cluster, rctx.project.as_ref()) },
        resolve::resolve_env_references(&rctx, ctx.lookup.as_ref()),
    )?;

    ctx.status
        .set_phase(namespace, name, InstancePhase::Patching)
        .await?;
    let target = GenerateTarget {
        name,
        namespace,
        kind,
        uid: instance.metadata.uid.as_deref(),
    };
    let generated = patch::generate(&target, &resolved, &references)?;
    ctx.resources.apply(namespace, &generated).await?;

    ctx.status
        .set_phase(namespace, name, InstancePhase::Publishing)
        .await?;
    let set = outputs::compute(&rctx, &resolved, &instance.spec.publish)?;
    outputs::publish(&rctx, ctx.outputs.as_ref(), &set).await?;

    Ok(set.outputs)
}

/// Error policy for the instance controller.
///
/// Retryable errors (dangling references, timeouts, transient API failures)
/// requeue with a short backoff. Permanent errors requeue at the standard
/// resync interval: the fix usually lands in a config object the controller
/// does not watch, so waiting for the instance's own spec to change would
/// stall the instance forever.
pub fn error_policy(instance: Arc<WorkloadInstance>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        instance = %instance.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(30))
    } else {
        Action::requeue(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use serde_json::json;
    use strata_common::crd::{
        EnvironmentMeta, StrataClusterConfig, StrataClusterConfigSpec, StrataProjectConfig,
        WorkloadInstanceSpec, WorkloadKind,
    };
    use strata_resolver::context::TargetInstance;
    use strata_resolver::k8s::Secret;

    mock! {
        ConfigSrc {}
        #[async_trait]
        impl ConfigSource for ConfigSrc {
            async fn list_cluster_configs(&self) -> Result<Vec<StrataClusterConfig>>;
            async fn list_project_configs(&self, project: &str) -> Result<Vec<StrataProjectConfig>>;
        }
    }

    mock! {
        Lookup {}
        #[async_trait]
        impl InstanceLookup for Lookup {
            async fn get_instance(
                &self,
                namespace: &str,
                name: &str,
            ) -> Result<Option<TargetInstance>>;
        }
    }

    mock! {
        Sink {}
        #[async_trait]
        impl OutputSink for Sink {
            async fn replace_outputs(
                &self,
                namespace: &str,
                name: &str,
                outputs: &BTreeMap<String, String>,
            ) -> Result<()>;
            async fn apply_connection_secret(&self, secret: &Secret) -> Result<()>;
        }
    }

    fn test_instance(values: serde_json::Value) -> Arc<WorkloadInstance> {
        let mut instance = WorkloadInstance::new(
            "api",
            WorkloadInstanceSpec {
                kind: WorkloadKind::Service,
                values: serde_json::from_value(values).unwrap(),
                publish: vec![],
            },
        );
        instance.metadata.namespace = Some("team-a".to_string());
        instance.metadata.uid = Some("uid-1".to_string());
        instance.metadata.generation = Some(4);
        Arc::new(instance)
    }

    fn cluster_config() -> StrataClusterConfig {
        StrataClusterConfig::new(
            "prod",
            StrataClusterConfigSpec {
                environment: EnvironmentMeta {
                    name: "prod".to_string(),
                    domain: "cluster.local".to_string(),
                    region: None,
                },
                defaults: Default::default(),
            },
        )
    }

    struct ContextBuilder {
        config: MockConfigSrc,
        lookup: MockLookup,
        resources: MockResourceSink,
        outputs: MockSink,
        status: MockStatusWriter,
    }

    impl ContextBuilder {
        fn new() -> Self {
            let mut config = MockConfigSrc::new();
            config
                .expect_list_cluster_configs()
                .returning(|| Ok(vec![cluster_config()]));
            config
                .expect_list_project_configs()
                .returning(|_| Ok(vec![]));

            let mut status = MockStatusWriter::new();
            status.expect_set_phase().returning(|_, _, _| Ok(()));

            Self {
                config,
                lookup: MockLookup::new(),
                resources: MockResourceSink::new(),
                outputs: MockSink::new(),
                status,
            }
        }

        fn build(self) -> Arc<Context> {
            Arc::new(Context {
                config_source: Arc::new(self.config),
                lookup: Arc::new(self.lookup),
                resources: Arc::new(self.resources),
                outputs: Arc::new(self.outputs),
                status: Arc::new(self.status),
            })
        }
    }

    #[tokio::test]
    async fn successful_pass_reaches_ready_and_requeues() {
        let mut b = ContextBuilder::new();
        b.resources
            .expect_apply()
            .withf(|ns, generated| ns == "team-a" && generated.workload.is_some())
            .times(1)
            .returning(|_, _| Ok(()));
        b.outputs
            .expect_replace_outputs()
            .withf(|ns, name, outputs| {
                ns == "team-a" && name == "api" && outputs.contains_key("host")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        b.outputs
            .expect_apply_connection_secret()
            .withf(|secret| secret.metadata.name == "api-conn")
            .times(1)
            .returning(|_| Ok(()));
        b.status
            .expect_update()
            .withf(|_, _, status| {
                status.phase == InstancePhase::Ready
                    && status.observed_generation == Some(4)
                    && status.outputs.contains_key("host")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let action = reconcile(test_instance(json!({ "image": "img" })), b.build())
            .await
            .expect("reconcile");
        assert_eq!(action, Action::requeue(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn missing_required_value_records_failed_status() {
        let mut b = ContextBuilder::new();
        b.status
            .expect_update()
            .withf(|_, _, status| {
                status.phase == InstancePhase::Failed
                    && status.conditions[0].reason == "MissingRequiredValue"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        // No image anywhere in the merge chain
        let err = reconcile(test_instance(json!({})), b.build())
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::MissingRequiredValue { .. }));
    }

    #[tokio::test]
    async fn dangling_reference_fails_retryably() {
        let mut b = ContextBuilder::new();
        b.lookup
            .expect_get_instance()
            .returning(|_, _| Ok(None));
        b.status
            .expect_update()
            .withf(|_, _, status| {
                status.conditions[0].reason == "ReferenceTargetNotFound"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let instance = test_instance(json!({
            "image": "img",
            "env": { "DB_HOST": "outputs/db/host" }
        }));
        let err = reconcile(instance, b.build()).await.expect_err("must fail");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn instance_without_namespace_awaits_change() {
        let mut instance = WorkloadInstance::new(
            "orphan",
            WorkloadInstanceSpec {
                kind: WorkloadKind::Service,
                values: Default::default(),
                publish: vec![],
            },
        );
        instance.metadata.namespace = None;

        let ctx = ContextBuilder::new().build();
        let action = reconcile(Arc::new(instance), ctx).await.expect("ok");
        assert_eq!(action, Action::await_change());
    }

    #[test]
    fn error_policy_backs_off_on_retryable_errors() {
        let ctx = ContextBuilder::new().build();
        let action = error_policy(
            test_instance(json!({})),
            &Error::target_not_found("db", "team-a"),
            ctx,
        );
        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    }

    /// Permanent errors are usually fixed in a config object the controller
    /// does not watch (a missing cluster config, a project override), so
    /// they keep requeuing at the resync interval instead of waiting on the
    /// instance's own spec. A fixed config is picked up on the next pass
    /// without anyone touching the instance.
    #[test]
    fn error_policy_retries_permanent_errors_at_resync_interval() {
        let ctx = ContextBuilder::new().build();
        for err in [
            Error::missing_required("image"),
            Error::ConfigNotFound {
                selector: "strata.dev/type=cluster".to_string(),
            },
            Error::cross_namespace("secrets", "other::secrets/vault/tls"),
        ] {
            let action = error_policy(test_instance(json!({})), &err, ctx.clone());
            assert_eq!(action, Action::requeue(Duration::from_secs(60)));
        }
    }
}
