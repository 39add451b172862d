//! Routing entry data model.
//!
//! # Responsibilities
//! - Immutable description of one routable endpoint
//! - Literal-prefix extraction used for bucketing
//!
//! # Design Decisions
//! - Entries are immutable after construction and shared via Arc
//! - Method matching is a set or an explicit wildcard, no regex
//! - `interface_type == "MULTIPLE"` is the reserved marker for interfaces
//!   with several providers; such entries require a module hint to match

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::Url;

/// Reserved interface type marking "multiple providers for this interface".
pub const INTERFACE_TYPE_MULTIPLE: &str = "MULTIPLE";

/// HTTP methods an endpoint accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MethodSpec {
    /// Matches every method (declared as `"*"`).
    Any(String),
    /// Explicit method set, upper-case.
    Set(BTreeSet<String>),
}

impl MethodSpec {
    /// Build from a declaration list; a single `"*"` means any method.
    pub fn from_declared(methods: &[String]) -> Self {
        if methods.iter().any(|m| m == "*") {
            MethodSpec::Any("*".to_string())
        } else {
            MethodSpec::Set(methods.iter().map(|m| m.to_uppercase()).collect())
        }
    }

    /// Whether the given request method is accepted.
    pub fn allows(&self, method: &str) -> bool {
        match self {
            MethodSpec::Any(_) => true,
            MethodSpec::Set(set) => set.contains(&method.to_uppercase()),
        }
    }
}

/// One declared endpoint of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Accepted methods.
    pub methods: MethodSpec,

    /// Path pattern: literal characters, `{name}` single-segment parameters,
    /// and at most one trailing `*`. A pattern without wildcards is a
    /// literal path.
    pub path_pattern: String,

    /// Permissions the caller must hold.
    #[serde(default)]
    pub permissions_required: Vec<String>,

    /// Permission prefixes the module would like surfaced in a header.
    #[serde(default)]
    pub permissions_desired: Vec<String>,
}

/// Immutable routing entry: one endpoint of one interface of one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// Providing module, e.g. "mod-orders-2.1.0".
    pub module_id: String,

    /// Base URL the request is forwarded to.
    pub base_location: Url,

    /// Interface the endpoint belongs to.
    pub interface_id: String,

    /// Interface type; `Some("MULTIPLE")` marks multi-provider interfaces.
    pub interface_type: Option<String>,

    /// The endpoint itself.
    pub endpoint: Endpoint,
}

impl RoutingEntry {
    /// Whether this entry belongs to a multi-provider interface.
    pub fn is_multiple(&self) -> bool {
        self.interface_type.as_deref() == Some(INTERFACE_TYPE_MULTIPLE)
    }

    /// Literal prefix of the pattern: everything before the first `*` or `{`.
    /// Used as the bucket key in the route table.
    pub fn literal_prefix(&self) -> &str {
        literal_prefix(&self.endpoint.path_pattern)
    }
}

/// Pattern substring preceding its first `*` or `{`.
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '{']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}
