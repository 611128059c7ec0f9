//! Supporting types for Strata CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Workload kinds a [`super::WorkloadInstance`] can describe
///
/// The kind keys the cluster config's defaults table and selects the base
/// resource skeleton during patch application.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// Long-running service backed by a Deployment
    #[default]
    Service,
    /// Long-running background worker backed by a Deployment (no ports)
    Worker,
    /// Run-to-completion Job
    Job,
    /// Secrets-abstraction bundle; the target of `secrets/` references
    Secrets,
    /// Config-map-abstraction bundle; the target of `configs/` references
    Config,
}

impl std::str::FromStr for WorkloadKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "service" => Ok(Self::Service),
            "worker" => Ok(Self::Worker),
            "job" => Ok(Self::Job),
            "secrets" => Ok(Self::Secrets),
            "config" => Ok(Self::Config),
            _ => Err(crate::Error::serialization(format!(
                "invalid workload kind: {s}, expected one of: service, worker, job, secrets, config"
            ))),
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Worker => write!(f, "worker"),
            Self::Job => write!(f, "job"),
            Self::Secrets => write!(f, "secrets"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// Stages of one reconciliation pass
///
/// `Pending -> LoadingConfig -> Resolving -> Patching -> Publishing -> Ready`.
/// Any stage may transition to `Failed`; the retry is scheduled by the
/// controller's error policy, not inside the pipeline.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum InstancePhase {
    /// Instance observed, no pass started yet
    #[default]
    Pending,
    /// Fetching the two-tier configuration objects
    LoadingConfig,
    /// Running the value merge and reference resolution (in parallel)
    Resolving,
    /// Generating and applying the resource set
    Patching,
    /// Overwriting published outputs and the connection secret
    Publishing,
    /// Pass completed; outputs are visible to other instances
    Ready,
    /// Pass aborted; see conditions for the error
    Failed,
}

impl std::fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::LoadingConfig => write!(f, "LoadingConfig"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Patching => write!(f, "Patching"),
            Self::Publishing => write!(f, "Publishing"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
///
/// Failures surface here: `reason` carries the machine-readable error code
/// and `message` the structured detail (target identifiers, available keys).
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Resolved)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}
