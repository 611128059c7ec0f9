//! Reference resolution against target instances
//!
//! Turns parsed [`ReferenceDescriptor`]s into [`ResolvedReference`]s: output
//! references become literal values copied out of the target's published
//! outputs; connection, secret, and config references become pointers the
//! patch stage injects as provider-native references, never inlined.
//!
//! All target lookups go through the reconciliation context's cache, so
//! repeated references to one target cost a single external call per pass.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use strata_common::crd::WorkloadKind;
use strata_common::{Error, Result, SYSTEM_NAMESPACE};
use tracing::debug;

use crate::context::{InstanceLookup, ReconciliationContext};
use crate::reference::{parse, ReferenceDescriptor};

/// A reference resolved to something the patch stage can inject
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedReference {
    /// Literal value, inlined directly into the field (outputs only)
    Literal(String),
    /// Pointer into a secret; injected as a secret reference field
    SecretPointer {
        /// Secret resource name
        name: String,
        /// Key within the secret; absent means the whole secret
        key: Option<String>,
    },
    /// Pointer into a config map; injected as a config reference field
    ConfigPointer {
        /// ConfigMap resource name
        name: String,
        /// Key within the config map; absent means the whole map
        key: Option<String>,
    },
}

/// Resolve a single descriptor against the owning (or explicitly named)
/// namespace.
pub async fn resolve(
    ctx: &ReconciliationContext,
    lookup: &dyn InstanceLookup,
    descriptor: &ReferenceDescriptor,
) -> Result<ResolvedReference> {
    match descriptor {
        ReferenceDescriptor::Output {
            namespace,
            instance,
            key,
        } => resolve_output(ctx, lookup, namespace.as_deref(), instance, key).await,

        ReferenceDescriptor::Connection { instance, key } => {
            let target = ctx
                .lookup(lookup, &ctx.namespace, instance)
                .await?
                .ok_or_else(|| Error::target_not_found(instance, &ctx.namespace))?;
            Ok(ResolvedReference::SecretPointer {
                name: target.connection_secret.clone(),
                key: Some(key.clone()),
            })
        }

        ReferenceDescriptor::Secret {
            instance,
            resource,
            key,
        } => {
            let target = ctx
                .lookup(lookup, &ctx.namespace, instance)
                .await?
                .ok_or_else(|| Error::target_not_found(instance, &ctx.namespace))?;
            if target.kind != WorkloadKind::Secrets {
                return Err(Error::invalid_reference(
                    format!("secrets/{instance}/{resource}"),
                    format!("instance '{instance}' is a {} instance, not a secrets bundle", target.kind),
                ));
            }
            Ok(ResolvedReference::SecretPointer {
                name: format!("{instance}-{resource}"),
                key: key.clone(),
            })
        }

        ReferenceDescriptor::Config {
            instance,
            resource,
            key,
        } => {
            let target = ctx
                .lookup(lookup, &ctx.namespace, instance)
                .await?
                .ok_or_else(|| Error::target_not_found(instance, &ctx.namespace))?;
            if target.kind != WorkloadKind::Config {
                return Err(Error::invalid_reference(
                    format!("configs/{instance}/{resource}"),
                    format!("instance '{instance}' is a {} instance, not a config bundle", target.kind),
                ));
            }
            Ok(ResolvedReference::ConfigPointer {
                name: format!("{instance}-{resource}"),
                key: key.clone(),
            })
        }
    }
}

/// Output references resolve a target namespace in fallback order: explicit
/// namespace if given; else the current namespace; else the shared platform
/// scope ([`SYSTEM_NAMESPACE`]).
async fn resolve_output(
    ctx: &ReconciliationContext,
    lookup: &dyn InstanceLookup,
    namespace: Option<&str>,
    instance: &str,
    key: &str,
) -> Result<ResolvedReference> {
    let target = match namespace {
        Some(ns) => ctx
            .lookup(lookup, ns, instance)
            .await?
            .ok_or_else(|| Error::target_not_found(instance, ns))?,
        None => {
            if let Some(found) = ctx.lookup(lookup, &ctx.namespace, instance).await? {
                found
            } else if let Some(found) = ctx.lookup(lookup, SYSTEM_NAMESPACE, instance).await? {
                debug!(instance, "output target found in platform scope");
                found
            } else {
                return Err(Error::target_not_found(instance, &ctx.namespace));
            }
        }
    };

    match target.outputs.get(key) {
        Some(value) => Ok(ResolvedReference::Literal(value.clone())),
        None => Err(Error::key_not_found(
            instance,
            key,
            target.outputs.keys().cloned().collect(),
        )),
    }
}

/// Parse and resolve every reference-valued env entry in the instance's own
/// spec.
///
/// Entries whose raw value is not a reference are left to the value-merge
/// leg. Independent resolutions run concurrently; the context cache
/// serializes first-inserts per target.
pub async fn resolve_env_references(
    ctx: &ReconciliationContext,
    lookup: &dyn InstanceLookup,
) -> Result<BTreeMap<String, ResolvedReference>> {
    let mut parsed = Vec::new();
    for (name, raw) in ctx.raw_env() {
        if let Some(descriptor) = parse(&raw)? {
            parsed.push((name, descriptor));
        }
    }

    let resolutions = parsed.iter().map(|(name, descriptor)| async move {
        let resolved = resolve(ctx, lookup, descriptor).await?;
        Ok::<_, Error>((name.clone(), resolved))
    });

    Ok(try_join_all(resolutions).await?.into_iter().collect())
}
