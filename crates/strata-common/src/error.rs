//! Error types for the Strata operator
//!
//! Errors are structured with fields to aid debugging in production: each
//! variant carries the identifiers (instance, namespace, field path, key
//! listing) needed to act on the failure without reproducing it.

use thiserror::Error;

/// Main error type for Strata operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The cluster config selector returned no records
    #[error("cluster config not found: selector '{selector}' matched no records")]
    ConfigNotFound {
        /// The label selector that was queried
        selector: String,
    },

    /// A config selector that must return at most one record returned several
    #[error("ambiguous config: selector '{selector}' matched {count} records, expected at most 1")]
    ConfigAmbiguous {
        /// The label selector that was queried
        selector: String,
        /// Number of records the selector matched
        count: usize,
    },

    /// No level of the merge chain supplied a value for a required field
    #[error("missing required value for field '{field}'")]
    MissingRequiredValue {
        /// The field path that resolved to nothing
        field: String,
    },

    /// A referenced instance does not exist
    #[error("reference target '{instance}' not found in namespace '{namespace}'")]
    ReferenceTargetNotFound {
        /// Name of the referenced instance
        instance: String,
        /// Namespace that was searched
        namespace: String,
    },

    /// A referenced instance exists but does not publish the requested key
    #[error(
        "instance '{instance}' does not publish key '{key}' (available keys: {})",
        available_keys.join(", ")
    )]
    ReferenceKeyNotFound {
        /// Name of the referenced instance
        instance: String,
        /// The key that was requested
        key: String,
        /// Keys the instance actually publishes
        available_keys: Vec<String>,
    },

    /// An explicit namespace was used on a reference type that must stay
    /// within the consumer's namespace
    #[error("cross-namespace violation: '{ref_type}' references cannot name a namespace ({path})")]
    CrossNamespaceViolation {
        /// The reference type that was attempted (connections, secrets, configs)
        ref_type: String,
        /// The raw reference string
        path: String,
    },

    /// A reference prefix matched but the path shape is wrong
    #[error("invalid reference '{path}': {message}")]
    InvalidReference {
        /// The raw reference string
        path: String,
        /// Description of what is malformed
        message: String,
    },

    /// An external call exceeded its deadline
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// The operation that exceeded its deadline
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a missing-required-value error for a field path
    pub fn missing_required(field: impl Into<String>) -> Self {
        Self::MissingRequiredValue {
            field: field.into(),
        }
    }

    /// Create a reference-target-not-found error
    pub fn target_not_found(instance: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::ReferenceTargetNotFound {
            instance: instance.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a reference-key-not-found error listing the available keys
    pub fn key_not_found(
        instance: impl Into<String>,
        key: impl Into<String>,
        available_keys: Vec<String>,
    ) -> Self {
        Self::ReferenceKeyNotFound {
            instance: instance.into(),
            key: key.into(),
            available_keys,
        }
    }

    /// Create a cross-namespace-violation error
    pub fn cross_namespace(ref_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self::CrossNamespaceViolation {
            ref_type: ref_type.into(),
            path: path.into(),
        }
    }

    /// Create an invalid-reference error
    pub fn invalid_reference(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidReference {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for a named operation
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Machine-readable error code, used as the condition reason on the
    /// reconciled instance's status.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "KubeError",
            Error::ConfigNotFound { .. } => "ConfigNotFound",
            Error::ConfigAmbiguous { .. } => "ConfigAmbiguous",
            Error::MissingRequiredValue { .. } => "MissingRequiredValue",
            Error::ReferenceTargetNotFound { .. } => "ReferenceTargetNotFound",
            Error::ReferenceKeyNotFound { .. } => "ReferenceKeyNotFound",
            Error::CrossNamespaceViolation { .. } => "CrossNamespaceViolation",
            Error::InvalidReference { .. } => "InvalidReference",
            Error::Timeout { .. } => "Timeout",
            Error::Serialization { .. } => "SerializationError",
        }
    }

    /// Check if this error is retryable
    ///
    /// Not-found references and timeouts are transient (the target may appear
    /// later); config and reference-grammar errors require a spec or config
    /// change, so backoff retries cannot fix them. The periodic resync still
    /// re-runs those once the objects change.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout).
                // Don't retry on 4xx errors (validation, not found, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::ConfigNotFound { .. } => false,
            Error::ConfigAmbiguous { .. } => false,
            Error::MissingRequiredValue { .. } => false,
            Error::ReferenceTargetNotFound { .. } => true,
            Error::ReferenceKeyNotFound { .. } => true,
            Error::CrossNamespaceViolation { .. } => false,
            Error::InvalidReference { .. } => false,
            Error::Timeout { .. } => true,
            Error::Serialization { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation During Configuration Resolution
    // ==========================================================================
    //
    // These tests demonstrate how errors flow through the system during one
    // reconciliation pass. Each error type represents a different failure
    // category with specific retry semantics.

    /// Story: a missing cluster config aborts the whole pass
    ///
    /// Exactly one cluster config must exist per environment. Zero or
    /// multiple matches is an operator-environment problem, not something a
    /// backoff retry can fix.
    #[test]
    fn story_cluster_config_cardinality_is_fatal() {
        let err = Error::ConfigNotFound {
            selector: "strata.dev/type=cluster".to_string(),
        };
        assert!(err.to_string().contains("matched no records"));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "ConfigNotFound");

        let err = Error::ConfigAmbiguous {
            selector: "strata.dev/type=cluster".to_string(),
            count: 3,
        };
        assert!(err.to_string().contains("matched 3 records"));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "ConfigAmbiguous");
    }

    /// Story: missing required values fail fast with the field path
    ///
    /// When no merge level supplies a value for a required field, the whole
    /// resource generation aborts and the status names the field.
    #[test]
    fn story_missing_required_value_names_the_field() {
        let err = Error::missing_required("image");
        assert!(err.to_string().contains("'image'"));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "MissingRequiredValue");
    }

    /// Story: dangling references are retryable
    ///
    /// A referenced instance may simply not have been reconciled yet; the
    /// next pass can succeed without anyone touching the consumer's spec.
    #[test]
    fn story_dangling_references_retry() {
        let err = Error::target_not_found("db", "team-a");
        assert!(err.to_string().contains("'db'"));
        assert!(err.to_string().contains("'team-a'"));
        assert!(err.is_retryable());

        let err = Error::key_not_found("db", "hostname", vec!["host".into(), "port".into()]);
        assert!(err.is_retryable());
    }

    /// Story: key-not-found messages list the keys that do exist
    ///
    /// The listing is the difference between a debuggable failure and a
    /// guessing game, so it is part of the message contract.
    #[test]
    fn story_key_not_found_lists_available_keys() {
        let err = Error::key_not_found("db", "hostname", vec!["host".into(), "port".into()]);
        let msg = err.to_string();
        assert!(msg.contains("'hostname'"));
        assert!(msg.contains("available keys: host, port"));
    }

    /// Story: cross-namespace violations are permanent
    ///
    /// Only output references may name a namespace. Anything else is a
    /// misconfiguration that retrying cannot repair.
    #[test]
    fn story_cross_namespace_violation_is_permanent() {
        let err = Error::cross_namespace("secrets", "other::secrets/vault/tls");
        assert!(err.to_string().contains("secrets"));
        assert!(err.to_string().contains("other::secrets/vault/tls"));
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "CrossNamespaceViolation");
    }

    /// Story: timeouts retry via the external backoff
    #[test]
    fn story_timeouts_are_transient() {
        let err = Error::timeout("cluster config query");
        assert!(err.to_string().contains("cluster config query"));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "Timeout");
    }

    /// Story: error helper functions accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let field = format!("env.{}", "DB_HOST");
        let err = Error::missing_required(field);
        assert!(err.to_string().contains("env.DB_HOST"));

        let err = Error::invalid_reference("outputs/db", "expected <instance>/<key>");
        assert!(err.to_string().contains("outputs/db"));
        assert!(!err.is_retryable());
    }
}
