//! Reference grammar parser
//!
//! Parses raw string field values into typed [`ReferenceDescriptor`]s. The
//! grammar, namespace part first:
//!
//! ```text
//! [<namespace>::]outputs/<instance>/<key>
//! connections/<instance>/<key>
//! secrets/<instance>/<resource>[/<key>]
//! configs/<instance>/<resource>[/<key>]
//! ```
//!
//! Only `outputs/` references may carry an explicit namespace; the other
//! types point at secret- or config-backed material and must stay inside the
//! consumer's namespace. Strings that match no prefix are plain literals,
//! which callers must handle. The parser is pure and stateless; all
//! downstream code match-exhausts over the descriptor enum instead of
//! re-inspecting strings.

use strata_common::{Error, Result};

/// A parsed symbolic reference to another instance's published data
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceDescriptor {
    /// Literal value from a target's published outputs; the only variant
    /// that may cross namespaces
    Output {
        /// Explicit target namespace, if the reference named one
        namespace: Option<String>,
        /// Target instance name
        instance: String,
        /// Key in the target's published-outputs map
        key: String,
    },
    /// Pointer into a target's connection secret; never inlined
    Connection {
        /// Target instance name
        instance: String,
        /// Key in the target's connection secret
        key: String,
    },
    /// Pointer into a secrets-abstraction bundle resource
    Secret {
        /// Target secrets instance name
        instance: String,
        /// Named resource within the bundle
        resource: String,
        /// Key within the resource; absent means the whole resource
        key: Option<String>,
    },
    /// Pointer into a config-map-abstraction bundle resource
    Config {
        /// Target config instance name
        instance: String,
        /// Named resource within the bundle
        resource: String,
        /// Key within the resource; absent means the whole resource
        key: Option<String>,
    },
}

impl ReferenceDescriptor {
    /// The grammar prefix this descriptor was parsed from
    pub fn ref_type(&self) -> &'static str {
        match self {
            Self::Output { .. } => "outputs",
            Self::Connection { .. } => "connections",
            Self::Secret { .. } => "secrets",
            Self::Config { .. } => "configs",
        }
    }
}

/// Parse a raw field value.
///
/// Returns `Ok(None)` when the value is a plain literal (no reference prefix
/// matched). A matched prefix with a malformed path is an error, not a
/// literal: silently inlining `outputs/db` would mask a typo.
pub fn parse(raw: &str) -> Result<Option<ReferenceDescriptor>> {
    let (namespace, remainder) = match raw.split_once("::") {
        Some((ns, rest)) => (Some(ns), rest),
        None => (None, raw),
    };

    let descriptor = if let Some(path) = remainder.strip_prefix("outputs/") {
        let (instance, key) = split_exactly_two(raw, path, "<instance>/<key>")?;
        let namespace = match namespace {
            Some("") => return Err(Error::invalid_reference(raw, "empty namespace")),
            ns => ns.map(str::to_string),
        };
        ReferenceDescriptor::Output {
            namespace,
            instance,
            key,
        }
    } else if let Some(path) = remainder.strip_prefix("connections/") {
        reject_namespace(namespace, "connections", raw)?;
        let (instance, key) = split_exactly_two(raw, path, "<instance>/<key>")?;
        ReferenceDescriptor::Connection { instance, key }
    } else if let Some(path) = remainder.strip_prefix("secrets/") {
        reject_namespace(namespace, "secrets", raw)?;
        let (instance, resource, key) = split_two_or_three(raw, path)?;
        ReferenceDescriptor::Secret {
            instance,
            resource,
            key,
        }
    } else if let Some(path) = remainder.strip_prefix("configs/") {
        reject_namespace(namespace, "configs", raw)?;
        let (instance, resource, key) = split_two_or_three(raw, path)?;
        ReferenceDescriptor::Config {
            instance,
            resource,
            key,
        }
    } else {
        // No prefix matched: a literal, even if it contained `::`
        return Ok(None);
    };

    Ok(Some(descriptor))
}

fn reject_namespace(namespace: Option<&str>, ref_type: &str, raw: &str) -> Result<()> {
    match namespace {
        Some(_) => Err(Error::cross_namespace(ref_type, raw)),
        None => Ok(()),
    }
}

fn split_exactly_two(raw: &str, path: &str, shape: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [a, b] if !a.is_empty() && !b.is_empty() => Ok((a.to_string(), b.to_string())),
        _ => Err(Error::invalid_reference(raw, format!("expected {shape}"))),
    }
}

fn split_two_or_three(raw: &str, path: &str) -> Result<(String, String, Option<String>)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [a, b] if !a.is_empty() && !b.is_empty() => Ok((a.to_string(), b.to_string(), None)),
        [a, b, c] if !a.is_empty() && !b.is_empty() && !c.is_empty() => {
            Ok((a.to_string(), b.to_string(), Some(c.to_string())))
        }
        _ => Err(Error::invalid_reference(
            raw,
            "expected <instance>/<resource>[/<key>]",
        )),
    }
}
