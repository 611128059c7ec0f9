//! Two-tier configuration loading
//!
//! Fetches the cluster-wide and per-project config objects by label
//! selector. The cluster tier must match exactly one record; the project
//! tier matches zero or one. Loaded results live in the reconciliation
//! context for the remainder of the pass and are discarded with it.

use async_trait::async_trait;
use strata_common::crd::{
    StrataClusterConfig, StrataClusterConfigSpec, StrataProjectConfig, StrataProjectConfigSpec,
};
use strata_common::{
    Error, Result, CONFIG_TYPE_CLUSTER, CONFIG_TYPE_PROJECT, LABEL_CONFIG_PROJECT,
    LABEL_CONFIG_TYPE,
};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Selector for the cluster config tier
pub fn cluster_selector() -> String {
    format!("{LABEL_CONFIG_TYPE}={CONFIG_TYPE_CLUSTER}")
}

/// Selector for one project's config tier
pub fn project_selector(project: &str) -> String {
    format!("{LABEL_CONFIG_TYPE}={CONFIG_TYPE_PROJECT},{LABEL_CONFIG_PROJECT}={project}")
}

/// Source of the two-tier configuration objects.
///
/// The Kubernetes-backed implementation lives in the operator crate; tests
/// mock this trait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// List cluster-tier config records matching [`cluster_selector`]
    async fn list_cluster_configs(&self) -> Result<Vec<StrataClusterConfig>>;

    /// List project-tier config records matching [`project_selector`]
    async fn list_project_configs(&self, project: &str) -> Result<Vec<StrataProjectConfig>>;
}

/// The two config tiers loaded for one reconciliation pass
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    /// The environment's cluster config (mandatory)
    pub cluster: StrataClusterConfigSpec,
    /// The project's override config, if one exists
    pub project: Option<StrataProjectConfigSpec>,
}

/// Load both tiers for the given project, enforcing selector cardinality.
///
/// Zero cluster records is [`Error::ConfigNotFound`], multiple is
/// [`Error::ConfigAmbiguous`]; zero project records simply means "no
/// overrides".
pub async fn load(source: &dyn ConfigSource, project: &str) -> Result<LoadedConfig> {
    let mut clusters = source.list_cluster_configs().await?;
    let cluster = match clusters.len() {
        0 => {
            return Err(Error::ConfigNotFound {
                selector: cluster_selector(),
            })
        }
        1 => clusters.remove(0).spec,
        n => {
            return Err(Error::ConfigAmbiguous {
                selector: cluster_selector(),
                count: n,
            })
        }
    };

    let mut projects = source.list_project_configs(project).await?;
    let project_config = match projects.len() {
        0 => None,
        1 => Some(projects.remove(0).spec),
        n => {
            return Err(Error::ConfigAmbiguous {
                selector: project_selector(project),
                count: n,
            })
        }
    };

    debug!(
        environment = %cluster.environment.name,
        project,
        has_overrides = project_config.is_some(),
        "configuration loaded"
    );
    Ok(LoadedConfig {
        cluster,
        project: project_config,
    })
}
