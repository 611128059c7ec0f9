//! Strata operator - deployment-time configuration resolution for Kubernetes
//!
//! Strata reconciles `WorkloadInstance` resources: it merges field values
//! through a four-level precedence chain, resolves symbolic cross-instance
//! references, generates a deterministic resource set, and publishes each
//! instance's outputs for others to consume.
//!
//! The resolution engine itself lives in the `strata-resolver` crate; this
//! crate wires it to the cluster and runs the controller loop.

#![deny(missing_docs)]

pub mod controller;
pub mod sources;

pub use strata_common::{Error, Result};
