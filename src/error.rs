//! Error taxonomy and its mapping onto protocol status codes.
//!
//! # Responsibilities
//! - One error type for the whole request path
//! - Deterministic status mapping, tenant failures configurable by policy
//! - Structured wire shape with no internals leaked to callers

use serde::Serialize;
use thiserror::Error;

/// How tenant-level failures surface to callers.
///
/// `Standard` distinguishes an unknown tenant (404) from a disabled one
/// (403); `Opaque` reports both as 404 so probing cannot tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantErrorPolicy {
    #[default]
    Standard,
    Opaque,
}

/// Unified error for routing, filtering, token handling, and forwarding.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Malformed request the sidecar refuses to process.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Missing, malformed, expired, or revoked credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Valid credentials lacking a required permission.
    #[error("permission denied: {permission}")]
    Authorization { permission: String },

    /// The target tenant is not known to the platform.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),

    /// The target tenant exists but is not enabled for this module.
    #[error("tenant disabled: {0}")]
    TenantDisabled(String),

    /// No routing entry matched the request.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// A dependency (discovery, identity provider, destination module)
    /// failed or answered unusably.
    #[error("upstream failure: {context}")]
    Upstream {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A dependency did not answer within its deadline (seconds).
    #[error("upstream timed out after {0}s")]
    UpstreamTimeout(u64),
}

impl SidecarError {
    /// Protocol status for this error under the given tenant policy.
    pub fn status_code(&self, policy: TenantErrorPolicy) -> u16 {
        match self {
            SidecarError::Validation(_) => 400,
            SidecarError::Authentication(_) => 401,
            SidecarError::Authorization { .. } => 403,
            SidecarError::UnknownTenant(_) => 404,
            SidecarError::TenantDisabled(_) => match policy {
                TenantErrorPolicy::Standard => 403,
                TenantErrorPolicy::Opaque => 404,
            },
            SidecarError::RouteNotFound { .. } => 404,
            SidecarError::Upstream { .. } => 502,
            SidecarError::UpstreamTimeout(_) => 504,
        }
    }

    /// Stable machine-readable code, independent of the message text.
    pub fn code(&self) -> &'static str {
        match self {
            SidecarError::Validation(_) => "validation",
            SidecarError::Authentication(_) => "authentication",
            SidecarError::Authorization { .. } => "authorization",
            SidecarError::UnknownTenant(_) => "unknown_tenant",
            SidecarError::TenantDisabled(_) => "tenant_disabled",
            SidecarError::RouteNotFound { .. } => "route_not_found",
            SidecarError::Upstream { .. } => "upstream",
            SidecarError::UpstreamTimeout(_) => "upstream_timeout",
        }
    }

    /// Whether a fresh credential might turn this failure into a success.
    /// Drives the clear-and-retry-once path in the token caches.
    pub fn is_credential_staleness_candidate(&self) -> bool {
        matches!(self, SidecarError::Authentication(_))
    }

    /// Wire shape sent to callers. Upstream internals are not included.
    pub fn to_wire(&self) -> StructuredError {
        let parameters = match self {
            SidecarError::Authorization { permission } => {
                vec![("permission".to_string(), permission.clone())]
            }
            SidecarError::RouteNotFound { method, path } => vec![
                ("method".to_string(), method.clone()),
                ("path".to_string(), path.clone()),
            ],
            SidecarError::UnknownTenant(tenant) | SidecarError::TenantDisabled(tenant) => {
                vec![("tenant".to_string(), tenant.clone())]
            }
            _ => vec![],
        };
        StructuredError {
            code: self.code().to_string(),
            message: self.to_string(),
            parameters,
        }
    }
}

/// Structured error body returned to callers.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    pub code: String,
    pub message: String,
    pub parameters: Vec<(String, String)>,
}
