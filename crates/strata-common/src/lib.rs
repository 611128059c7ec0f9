//! Common types for Strata: CRDs, errors, and shared constants

#![deny(missing_docs)]

pub mod crd;
pub mod error;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for all Strata CRDs
pub const API_GROUP: &str = "strata.dev";

/// API version for all Strata CRDs
pub const API_VERSION: &str = "strata.dev/v1alpha1";

/// Namespace for Strata system resources (cluster config, operator).
///
/// Also acts as the shared platform scope: an output reference whose target
/// does not exist in the consumer's namespace falls back to this namespace.
pub const SYSTEM_NAMESPACE: &str = "strata-system";

/// Label key identifying a config object's tier (`cluster` or `project`)
pub const LABEL_CONFIG_TYPE: &str = "strata.dev/type";

/// Label value for the cluster-wide config tier
pub const CONFIG_TYPE_CLUSTER: &str = "cluster";

/// Label value for the per-project config tier
pub const CONFIG_TYPE_PROJECT: &str = "project";

/// Label key naming the project a project config belongs to
pub const LABEL_CONFIG_PROJECT: &str = "strata.dev/project";

/// Label key carrying the owning instance name on generated resources
pub const LABEL_NAME: &str = "strata.dev/name";

/// Label key marking resources managed by Strata
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for [`LABEL_MANAGED_BY`] on generated resources
pub const LABEL_MANAGED_BY_STRATA: &str = "strata";

/// Annotation carrying the resolved-config hash on generated pod templates
pub const ANNOTATION_CONFIG_HASH: &str = "strata.dev/config-hash";

/// Suffix for deterministic connection-secret names
pub const CONNECTION_SECRET_SUFFIX: &str = "-conn";

/// Deterministic connection-secret name for an instance.
///
/// Consumers derive this name without fetching the secret, so it must never
/// depend on anything but the instance name.
pub fn connection_secret_name(instance: &str) -> String {
    format!("{instance}{CONNECTION_SECRET_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_secret_name_is_deterministic() {
        assert_eq!(connection_secret_name("db"), "db-conn");
        assert_eq!(connection_secret_name("db"), connection_secret_name("db"));
    }
}
