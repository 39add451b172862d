//! Per-request context shared across lookup and filter stages.
//!
//! # Responsibilities
//! - Carry the abstract request (method, path, query, headers, body)
//! - Accumulate pipeline state: resolved tenant, parsed claims, matched
//!   routing entry, self-request flag, timing markers
//!
//! # Design Decisions
//! - Headers use `http::HeaderMap`: multi-valued and case-insensitive
//! - One context per inbound/outbound call, discarded after the response
//! - Raw tokens are kept for downstream grants; log sites hash them

use std::sync::Arc;
use std::time::Instant;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use uuid::Uuid;

use crate::auth::jwt::Claims;
use crate::routing::entry::RoutingEntry;

/// Header naming a specific provider when several share an interface.
pub const HEADER_MODULE_HINT: &str = "x-module-hint";
/// Header annotating gateway-fallback entries with an intended module.
pub const HEADER_MODULE_ID: &str = "x-module-id";
/// Tenant header stamped by the platform.
pub const HEADER_TENANT: &str = "x-tenant-id";
/// System (module-to-module) token header.
pub const HEADER_SYSTEM_TOKEN: &str = "x-system-token";
/// Signature stamped by this sidecar before forwarding.
pub const HEADER_SIDECAR_SIGNATURE: &str = "x-sidecar-signature";
/// Header carrying the caller's desired permissions.
pub const HEADER_PERMISSIONS_DESIRED: &str = "x-permissions-desired";
/// Correlation id propagated end to end.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Platform headers that must appear at most once per request.
pub const SINGLETON_PLATFORM_HEADERS: &[&str] = &[
    HEADER_TENANT,
    HEADER_SYSTEM_TOKEN,
    HEADER_SIDECAR_SIGNATURE,
    HEADER_MODULE_ID,
    HEADER_REQUEST_ID,
];

/// Traffic direction through the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Gateway → hosted module.
    Ingress,
    /// Hosted module → other destination.
    Egress,
}

/// Per-request mutable state bag.
#[derive(Debug)]
pub struct RequestContext {
    /// Correlation id; generated when the caller supplied none.
    pub request_id: String,

    pub direction: Direction,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,

    /// Tenant resolved from token claims (or trusted headers).
    pub tenant: Option<String>,

    /// Parsed system (module-to-module) token claims.
    pub system_claims: Option<Claims>,

    /// Parsed end-user token claims; replaced on impersonation.
    pub user_claims: Option<Claims>,

    /// Raw end-user token; replaced on impersonation.
    pub user_token: Option<String>,

    /// Raw system token.
    pub system_token: Option<String>,

    /// Routing entry the lookup chain resolved.
    pub routing: Option<Arc<RoutingEntry>>,

    /// Set by self-request detection; later filters treat the request as
    /// trusted and skip tenant/authorization work.
    pub self_request: bool,

    /// Egress destination scheme decision: `Some(true)` = TLS.
    pub tls_destination: Option<bool>,

    /// Named timing markers for diagnostics.
    pub timings: Vec<(&'static str, Instant)>,
}

impl RequestContext {
    /// Create a context for a request, generating a request id when the
    /// headers carry none.
    pub fn new(direction: Direction, method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        let request_id = headers
            .get(HEADER_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            direction,
            method,
            path: path.into(),
            query: None,
            headers,
            body: Vec::new(),
            tenant: None,
            system_claims: None,
            user_claims: None,
            user_token: None,
            system_token: None,
            routing: None,
            self_request: false,
            tls_destination: None,
            timings: Vec::new(),
        }
    }

    /// First value of a header, as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Number of values present for a header.
    pub fn header_count(&self, name: &str) -> usize {
        self.headers.get_all(name).iter().count()
    }

    /// Replace a header with a single value. A value that is not legal
    /// header bytes is dropped with a warning; the value itself is never
    /// logged since it may carry a credential.
    pub fn set_header(&mut self, name: &'static str, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(HeaderName::from_static(name), value);
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %self.request_id,
                    header = name,
                    "Dropped header value containing illegal characters"
                );
            }
        }
    }

    /// Module hint, when the caller supplied one.
    pub fn module_hint(&self) -> Option<&str> {
        self.header(HEADER_MODULE_HINT)
    }

    /// Swap in an impersonated user identity.
    pub fn replace_user_identity(&mut self, token: String, claims: Claims) {
        self.user_token = Some(token);
        self.user_claims = Some(claims);
    }

    /// Record a named timing marker.
    pub fn mark(&mut self, name: &'static str) {
        self.timings.push((name, Instant::now()));
    }
}
