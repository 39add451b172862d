//! Collaborator boundaries.
//!
//! Everything the sidecar talks to lives behind one of these traits: the
//! discovery service, the tenant entitlement service, the secure store, the
//! identity provider, and the forwarding transport. Concrete transports
//! (HTTP clients, pub/sub consumers) implement them outside this crate.
//!
//! # Design Decisions
//! - Traits are object-safe and `Send + Sync` so implementations can be
//!   shared across the runtime behind `Arc<dyn …>`
//! - Every call is fallible and asynchronous; callers own timeouts

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::context::RequestContext;
use crate::error::SidecarError;
use crate::routing::entry::RoutingEntry;
use crate::token::Token;

/// One module as reported by bootstrap/discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module id, e.g. "mod-orders-2.1.0".
    pub module_id: String,

    /// Owning application id.
    pub application_id: String,

    /// Base URL requests to this module are forwarded to.
    pub base_location: Url,

    /// Declared interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceDescriptor>,
}

/// One interface of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDescriptor {
    pub id: String,

    /// `Some("MULTIPLE")` marks interfaces with several providers.
    #[serde(default, rename = "type")]
    pub interface_type: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,
}

/// One endpoint declaration. Carries either a pattern or a literal path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub methods: Vec<String>,

    #[serde(default)]
    pub path_pattern: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub permissions_required: Vec<String>,

    #[serde(default)]
    pub permissions_desired: Vec<String>,
}

impl EndpointDescriptor {
    /// The effective pattern: `path_pattern` wins over a literal `path`.
    pub fn pattern(&self) -> &str {
        self.path_pattern
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("")
    }
}

/// One module a tenant is entitled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitledModule {
    pub module_id: String,
    pub application_id: String,
}

/// Bootstrap and discovery lookups.
#[async_trait]
pub trait ModuleDiscovery: Send + Sync {
    /// Resolve one module's descriptor by exact id.
    async fn descriptor(&self, module_id: &str) -> Result<ModuleDescriptor, SidecarError>;
}

/// Tenant entitlement lookups. Used only by the dynamic routing lookup.
#[async_trait]
pub trait TenantEntitlement: Send + Sync {
    /// All modules the tenant is entitled to. Implementations must aggregate
    /// every upstream page; partial results are not acceptable here.
    async fn entitled_modules(&self, tenant: &str) -> Result<Vec<EntitledModule>, SidecarError>;
}

/// External secure store for client/user secrets.
///
/// Keys are namespaced by tenant/client/user, e.g.
/// `tenant/{tenant}/client/{client_id}`.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<String, SidecarError>;
    async fn set(&self, key: &str, secret: &str) -> Result<(), SidecarError>;
}

/// Parameters for an identity-provider token grant.
#[derive(Debug, Clone)]
pub enum GrantRequest {
    /// Module-to-module service token.
    ClientCredentials {
        tenant: String,
        client_id: String,
        client_secret: String,
    },
    /// System-user token.
    Password {
        tenant: String,
        username: String,
        password: String,
    },
    /// Refresh an existing token pair.
    RefreshToken { tenant: String, refresh_token: String },
    /// Impersonation: exchange a token for one representing a user in the
    /// target tenant.
    TokenExchange {
        target_tenant: String,
        subject_token: String,
        client_id: String,
        client_secret: String,
    },
}

impl GrantRequest {
    /// Tenant the grant executes against.
    pub fn tenant(&self) -> &str {
        match self {
            GrantRequest::ClientCredentials { tenant, .. } => tenant,
            GrantRequest::Password { tenant, .. } => tenant,
            GrantRequest::RefreshToken { tenant, .. } => tenant,
            GrantRequest::TokenExchange { target_tenant, .. } => target_tenant,
        }
    }
}

/// Introspection verdict from the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Introspection {
    /// Whether the token is currently valid.
    pub active: bool,

    /// Token expiry as seconds since the epoch, when the provider knows it.
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Remote identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Execute a token grant.
    async fn grant(&self, request: GrantRequest) -> Result<Token, SidecarError>;

    /// Verify a token's current validity.
    async fn introspect(&self, token: &str) -> Result<Introspection, SidecarError>;

    /// Evaluate a permission for the given token within a tenant.
    async fn evaluate_permission(
        &self,
        tenant: &str,
        token: &str,
        permission: &str,
    ) -> Result<bool, SidecarError>;

    /// Permissions held by the user the token represents.
    async fn user_permissions(
        &self,
        tenant: &str,
        token: &str,
    ) -> Result<Vec<String>, SidecarError>;
}

/// Response produced by the forwarding transport.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Forwarding transport. The call contract is in scope; the transport is not.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Send the (filtered) request to the resolved destination.
    async fn forward(
        &self,
        ctx: &RequestContext,
        entry: &RoutingEntry,
    ) -> Result<ForwardedResponse, SidecarError>;
}
