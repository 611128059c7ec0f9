//! Custom Resource Definitions for Strata
//!
//! Three CRDs under the `strata.dev/v1alpha1` group:
//! - [`WorkloadInstance`] - a deployable workload description being reconciled
//! - [`StrataClusterConfig`] - environment-wide defaults, exactly one per environment
//! - [`StrataProjectConfig`] - optional per-project overrides

mod config;
mod instance;
mod types;

pub use config::{
    EnvironmentMeta, StrataClusterConfig, StrataClusterConfigSpec, StrataProjectConfig,
    StrataProjectConfigSpec,
};
pub use instance::{PublishSpec, WorkloadInstance, WorkloadInstanceSpec, WorkloadInstanceStatus};
pub use types::{Condition, ConditionStatus, InstancePhase, WorkloadKind};
