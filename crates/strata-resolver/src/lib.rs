//! Strata resolver - the deployment-time configuration resolution engine
//!
//! Given a workload instance description and the two-tier configuration
//! objects, this crate computes final field values through precedence-based
//! merging and resolves symbolic cross-resource references into literals or
//! secret/config pointers, then combines both into a deterministic generated
//! resource set.
//!
//! # Pipeline
//!
//! Per reconciliation pass: [`config`] loads the tiers, then [`merge`] (value
//! resolution) and [`reference`]+[`resolve`] (reference resolution) run in
//! parallel, [`patch`] combines their results, and [`outputs`] publishes the
//! instance's own outputs last.
//!
//! # Modules
//!
//! - [`composition`] - per-kind declared field paths and composition defaults
//! - [`config`] - two-tier config loading with selector cardinality rules
//! - [`context`] - per-pass reconciliation context and target-lookup cache
//! - [`merge`] - the 4-level precedence merge
//! - [`reference`] - reference grammar parser
//! - [`resolve`] - reference resolution against target instances
//! - [`k8s`] - typed, deterministically serialized resource shapes
//! - [`patch`] - fixed-stage resource generation
//! - [`outputs`] - published-outputs and connection-secret publishing

#![deny(missing_docs)]

pub mod composition;
pub mod config;
pub mod context;
pub mod k8s;
pub mod merge;
pub mod outputs;
pub mod patch;
pub mod reference;
pub mod resolve;

pub use strata_common::{Error, Result};
