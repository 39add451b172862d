//! Hard deadlines for collaborator calls.
//!
//! # Responsibilities
//! - Bound outbound collaborator calls by the timeouts in [`TimeoutConfig`]
//! - Surface an elapsed deadline as [`SidecarError::UpstreamTimeout`]
//!
//! # Design Decisions
//! - Deadlines are decorators over the collaborator traits, wired once at
//!   startup; call sites stay unaware of timing
//! - A timed-out call is not cancelled upstream, the sidecar only stops
//!   waiting for it
//! - An elapsed deadline is retryable like any other upstream failure

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::SidecarError;
use crate::external::{
    EntitledModule, ForwardedResponse, Forwarder, GrantRequest, IdentityProvider, Introspection,
    ModuleDescriptor, ModuleDiscovery, TenantEntitlement,
};
use crate::routing::entry::RoutingEntry;
use crate::token::Token;

/// Await a collaborator call for at most `secs` seconds.
pub async fn with_deadline<T, Fut>(secs: u64, fut: Fut) -> Result<T, SidecarError>
where
    Fut: Future<Output = Result<T, SidecarError>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(SidecarError::UpstreamTimeout(secs)),
    }
}

/// Module discovery with a per-call deadline.
pub struct TimeboundDiscovery {
    inner: Arc<dyn ModuleDiscovery>,
    secs: u64,
}

impl TimeboundDiscovery {
    pub fn new(inner: Arc<dyn ModuleDiscovery>, secs: u64) -> Self {
        Self { inner, secs }
    }
}

#[async_trait]
impl ModuleDiscovery for TimeboundDiscovery {
    async fn descriptor(&self, module_id: &str) -> Result<ModuleDescriptor, SidecarError> {
        with_deadline(self.secs, self.inner.descriptor(module_id)).await
    }
}

/// Tenant entitlement with a per-call deadline.
pub struct TimeboundEntitlement {
    inner: Arc<dyn TenantEntitlement>,
    secs: u64,
}

impl TimeboundEntitlement {
    pub fn new(inner: Arc<dyn TenantEntitlement>, secs: u64) -> Self {
        Self { inner, secs }
    }
}

#[async_trait]
impl TenantEntitlement for TimeboundEntitlement {
    async fn entitled_modules(&self, tenant: &str) -> Result<Vec<EntitledModule>, SidecarError> {
        with_deadline(self.secs, self.inner.entitled_modules(tenant)).await
    }
}

/// Identity provider with a per-call deadline.
pub struct TimeboundIdentityProvider {
    inner: Arc<dyn IdentityProvider>,
    secs: u64,
}

impl TimeboundIdentityProvider {
    pub fn new(inner: Arc<dyn IdentityProvider>, secs: u64) -> Self {
        Self { inner, secs }
    }
}

#[async_trait]
impl IdentityProvider for TimeboundIdentityProvider {
    async fn grant(&self, request: GrantRequest) -> Result<Token, SidecarError> {
        with_deadline(self.secs, self.inner.grant(request)).await
    }

    async fn introspect(&self, token: &str) -> Result<Introspection, SidecarError> {
        with_deadline(self.secs, self.inner.introspect(token)).await
    }

    async fn evaluate_permission(
        &self,
        tenant: &str,
        token: &str,
        permission: &str,
    ) -> Result<bool, SidecarError> {
        with_deadline(self.secs, self.inner.evaluate_permission(tenant, token, permission)).await
    }

    async fn user_permissions(
        &self,
        tenant: &str,
        token: &str,
    ) -> Result<Vec<String>, SidecarError> {
        with_deadline(self.secs, self.inner.user_permissions(tenant, token)).await
    }
}

/// Forwarding transport with a per-call deadline.
pub struct TimeboundForwarder {
    inner: Arc<dyn Forwarder>,
    secs: u64,
}

impl TimeboundForwarder {
    pub fn new(inner: Arc<dyn Forwarder>, secs: u64) -> Self {
        Self { inner, secs }
    }
}

#[async_trait]
impl Forwarder for TimeboundForwarder {
    async fn forward(
        &self,
        ctx: &RequestContext,
        entry: &RoutingEntry,
    ) -> Result<ForwardedResponse, SidecarError> {
        with_deadline(self.secs, self.inner.forward(ctx, entry)).await
    }
}
