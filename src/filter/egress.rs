//! Egress filters: outbound calls leave with a service token, a system-user
//! fallback for the `Authorization` header, and a TLS destination decision.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{RequestContext, HEADER_SYSTEM_TOKEN, HEADER_TENANT};
use crate::error::SidecarError;
use crate::filter::{EgressFilter, Filter};
use crate::token::service::ServiceTokenCache;
use crate::token::token_hash;

pub const ORDER_SERVICE_TOKEN: i32 = 100;
pub const ORDER_SYSTEM_USER: i32 = 200;
pub const ORDER_TLS_DESTINATION: i32 = 300;

fn effective_tenant(ctx: &RequestContext) -> Result<String, SidecarError> {
    if let Some(tenant) = &ctx.tenant {
        return Ok(tenant.clone());
    }
    ctx.header(HEADER_TENANT)
        .map(str::to_string)
        .ok_or_else(|| SidecarError::Authentication("tenant not resolved for egress call".into()))
}

/// Injects the module's own service token into every outbound request.
pub struct ServiceTokenEgressFilter {
    tokens: Arc<ServiceTokenCache>,
}

impl ServiceTokenEgressFilter {
    pub fn new(tokens: Arc<ServiceTokenCache>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Filter for ServiceTokenEgressFilter {
    fn name(&self) -> &'static str {
        "service_token"
    }

    fn order(&self) -> i32 {
        ORDER_SERVICE_TOKEN
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let tenant = effective_tenant(ctx)?;
        let token = self.tokens.service_token(&tenant).await?;
        tracing::trace!(
            request_id = %ctx.request_id,
            tenant = %tenant,
            token = %token_hash(&token.access_token),
            "Attached service token to outbound request"
        );
        let access = token.access_token.clone();
        ctx.set_header(HEADER_SYSTEM_TOKEN, &access);
        ctx.set_header(HEADER_TENANT, &tenant);
        ctx.system_token = Some(token.access_token);
        Ok(())
    }
}

impl EgressFilter for ServiceTokenEgressFilter {}

/// Fills the `Authorization` header with a system-user token when the
/// original caller supplied none.
pub struct SystemUserEgressFilter {
    tokens: Arc<ServiceTokenCache>,
}

impl SystemUserEgressFilter {
    pub fn new(tokens: Arc<ServiceTokenCache>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Filter for SystemUserEgressFilter {
    fn name(&self) -> &'static str {
        "system_user"
    }

    fn order(&self) -> i32 {
        ORDER_SYSTEM_USER
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.header(http::header::AUTHORIZATION.as_str()).is_some()
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let tenant = effective_tenant(ctx)?;
        let token = self.tokens.system_user_token(&tenant).await?;
        let bearer = format!("Bearer {}", token.access_token);
        ctx.set_header("authorization", &bearer);
        Ok(())
    }
}

impl EgressFilter for SystemUserEgressFilter {}

/// Decides whether the forwarder should speak TLS, from the resolved
/// destination's scheme.
pub struct TlsDestinationFilter;

#[async_trait]
impl Filter for TlsDestinationFilter {
    fn name(&self) -> &'static str {
        "tls_destination"
    }

    fn order(&self) -> i32 {
        ORDER_TLS_DESTINATION
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.routing.is_none()
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        if let Some(entry) = &ctx.routing {
            ctx.tls_destination = Some(entry.base_location.scheme() == "https");
        }
        Ok(())
    }
}

impl EgressFilter for TlsDestinationFilter {}
