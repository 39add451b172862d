//! Ingress authentication filters: header validation, self-request
//! detection, JWT parsing, and tenant checks.
//!
//! # Ordering
//! ```text
//! 100 header validation     reject duplicate platform headers
//! 200 self-request          trusted loopback shortcut, sets ctx.self_request
//! 300 system JWT parse      module-to-module token
//! 400 user JWT parse        tolerant when a system JWT is present
//! 500 tenant resolution     single-tenant consistency unless cross-tenant
//! 600 tenant enabled        registry check (entitlement events)
//! ```
//!
//! Authorization-side filters (impersonation, permission evaluation,
//! signature, desired permissions) live in `authorize.rs`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{
    RequestContext, HEADER_SIDECAR_SIGNATURE, HEADER_SYSTEM_TOKEN, HEADER_TENANT,
    SINGLETON_PLATFORM_HEADERS,
};
use crate::auth::jwt::decode_claims_offloaded;
use crate::error::SidecarError;
use crate::events::{TenantRegistry, TenantStatus};
use crate::filter::{Filter, IngressFilter};

pub const ORDER_HEADER_VALIDATION: i32 = 100;
pub const ORDER_SELF_REQUEST: i32 = 200;
pub const ORDER_SYSTEM_JWT: i32 = 300;
pub const ORDER_USER_JWT: i32 = 400;
pub const ORDER_TENANT_RESOLUTION: i32 = 500;
pub const ORDER_TENANT_ENABLED: i32 = 600;

/// Rejects requests that carry a singleton platform header more than once.
pub struct HeaderValidationFilter;

#[async_trait]
impl Filter for HeaderValidationFilter {
    fn name(&self) -> &'static str {
        "header_validation"
    }

    fn order(&self) -> i32 {
        ORDER_HEADER_VALIDATION
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        for header in SINGLETON_PLATFORM_HEADERS {
            if ctx.header_count(header) > 1 {
                return Err(SidecarError::Validation(format!(
                    "duplicate platform header: {}",
                    header
                )));
            }
        }
        Ok(())
    }
}

impl IngressFilter for HeaderValidationFilter {}

/// Detects requests the module sent to itself through its own sidecar.
///
/// A request carrying this sidecar's own signature took the loopback path;
/// later tenant/authorization filters treat it as trusted and skip.
pub struct SelfRequestFilter {
    signature: Arc<str>,
}

impl SelfRequestFilter {
    pub fn new(signature: Arc<str>) -> Self {
        Self { signature }
    }
}

#[async_trait]
impl Filter for SelfRequestFilter {
    fn name(&self) -> &'static str {
        "self_request"
    }

    fn order(&self) -> i32 {
        ORDER_SELF_REQUEST
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        if ctx.header(HEADER_SIDECAR_SIGNATURE) == Some(self.signature.as_ref()) {
            ctx.self_request = true;
            tracing::debug!(request_id = %ctx.request_id, "Self-request detected");
        }
        Ok(())
    }
}

impl IngressFilter for SelfRequestFilter {}

/// Parses the system (module-to-module) token, when present.
///
/// A malformed system token is tolerated here; the user-JWT filter decides
/// whether the request still carries a usable identity.
pub struct SystemJwtFilter;

#[async_trait]
impl Filter for SystemJwtFilter {
    fn name(&self) -> &'static str {
        "system_jwt"
    }

    fn order(&self) -> i32 {
        ORDER_SYSTEM_JWT
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let token = match ctx.header(HEADER_SYSTEM_TOKEN) {
            Some(token) => token.to_string(),
            None => return Ok(()),
        };

        match decode_claims_offloaded(token.clone()).await {
            Ok(claims) => {
                ctx.system_claims = Some(claims);
                ctx.system_token = Some(token);
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    error = %err,
                    "System token unparseable; deferring to user token"
                );
            }
        }
        Ok(())
    }
}

impl IngressFilter for SystemJwtFilter {}

/// Parses the end-user token from the Authorization header.
///
/// Mutually tolerant with the system-JWT filter: a malformed or missing user
/// token is fatal only when no system token was parsed either. Self-requests
/// are trusted without any token.
pub struct UserJwtFilter;

fn bearer_token(ctx: &RequestContext) -> Option<String> {
    let value = ctx.header(http::header::AUTHORIZATION.as_str())?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::to_string)
}

#[async_trait]
impl Filter for UserJwtFilter {
    fn name(&self) -> &'static str {
        "user_jwt"
    }

    fn order(&self) -> i32 {
        ORDER_USER_JWT
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.self_request
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let has_system_identity = ctx.system_claims.is_some();

        let token = match bearer_token(ctx) {
            Some(token) => token,
            None if has_system_identity => return Ok(()),
            None => {
                return Err(SidecarError::Authentication(
                    "request carries no user or system token".into(),
                ))
            }
        };

        match decode_claims_offloaded(token.clone()).await {
            Ok(claims) => {
                ctx.user_claims = Some(claims);
                ctx.user_token = Some(token);
                Ok(())
            }
            Err(err) if has_system_identity => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    error = %err,
                    "User token unparseable; continuing on system identity"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl IngressFilter for UserJwtFilter {}

/// Resolves the request tenant from token claims.
pub struct TenantResolutionFilter {
    allow_cross_tenant: bool,
}

impl TenantResolutionFilter {
    pub fn new(allow_cross_tenant: bool) -> Self {
        Self { allow_cross_tenant }
    }
}

#[async_trait]
impl Filter for TenantResolutionFilter {
    fn name(&self) -> &'static str {
        "tenant_resolution"
    }

    fn order(&self) -> i32 {
        ORDER_TENANT_RESOLUTION
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.self_request
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let user_tenant = ctx
            .user_claims
            .as_ref()
            .map(|claims| claims.issuer_tenant())
            .transpose()?;
        let system_tenant = ctx
            .system_claims
            .as_ref()
            .map(|claims| claims.issuer_tenant())
            .transpose()?;

        if let (Some(user), Some(system)) = (&user_tenant, &system_tenant) {
            if user != system && !self.allow_cross_tenant {
                return Err(SidecarError::Authentication(format!(
                    "tokens reference different tenants: {} vs {}",
                    user, system
                )));
            }
        }

        let token_tenant = user_tenant
            .or(system_tenant)
            .ok_or_else(|| SidecarError::Authentication("no tenant in token claims".into()))?;

        // The tenant header names the target tenant. When it disagrees with
        // the token's issuer, the request is cross-tenant: the header wins
        // and the impersonation filter exchanges the token downstream.
        let tenant = match ctx.header(HEADER_TENANT) {
            Some(header_tenant) if header_tenant != token_tenant => {
                if !self.allow_cross_tenant {
                    return Err(SidecarError::Authentication(format!(
                        "tenant header {} disagrees with token tenant {}",
                        header_tenant, token_tenant
                    )));
                }
                header_tenant.to_string()
            }
            _ => token_tenant,
        };

        ctx.set_header(HEADER_TENANT, &tenant);
        ctx.tenant = Some(tenant);
        Ok(())
    }
}

impl IngressFilter for TenantResolutionFilter {}

/// Rejects requests for tenants this sidecar does not serve.
pub struct TenantEnabledFilter {
    registry: Arc<TenantRegistry>,
}

impl TenantEnabledFilter {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Filter for TenantEnabledFilter {
    fn name(&self) -> &'static str {
        "tenant_enabled"
    }

    fn order(&self) -> i32 {
        ORDER_TENANT_ENABLED
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.self_request
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let tenant = ctx
            .tenant
            .as_deref()
            .ok_or_else(|| SidecarError::Authentication("tenant not resolved".into()))?;

        match self.registry.status(tenant) {
            TenantStatus::Enabled => Ok(()),
            TenantStatus::Disabled => Err(SidecarError::TenantDisabled(tenant.to_string())),
            TenantStatus::Unknown => Err(SidecarError::UnknownTenant(tenant.to_string())),
        }
    }
}

impl IngressFilter for TenantEnabledFilter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{encode_unsigned, now_epoch_secs, Claims};
    use crate::context::Direction;
    use http::{HeaderMap, HeaderValue, Method};

    fn claims(tenant: &str) -> Claims {
        Claims {
            sub: "user-1".into(),
            iss: format!("https://idp.local/realms/{}", tenant),
            exp: now_epoch_secs() + 600,
            sid: Some("sess-1".into()),
            tenant: None,
        }
    }

    fn ctx(headers: HeaderMap) -> RequestContext {
        RequestContext::new(Direction::Ingress, Method::GET, "/foo", headers)
    }

    #[tokio::test]
    async fn duplicate_platform_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.append(HEADER_TENANT, HeaderValue::from_static("acme"));
        headers.append(HEADER_TENANT, HeaderValue::from_static("globex"));
        let mut ctx = ctx(headers);

        let err = HeaderValidationFilter.filter(&mut ctx).await.unwrap_err();
        assert!(matches!(err, SidecarError::Validation(_)));
    }

    #[tokio::test]
    async fn self_request_flag_set_on_own_signature() {
        let signature: Arc<str> = Arc::from("sig-123");
        let filter = SelfRequestFilter::new(Arc::clone(&signature));

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_SIDECAR_SIGNATURE, HeaderValue::from_static("sig-123"));
        let mut trusted = ctx(headers);
        filter.filter(&mut trusted).await.unwrap();
        assert!(trusted.self_request);

        let mut untrusted = ctx(HeaderMap::new());
        filter.filter(&mut untrusted).await.unwrap();
        assert!(!untrusted.self_request);
    }

    #[tokio::test]
    async fn missing_both_tokens_is_fatal() {
        let mut ctx = ctx(HeaderMap::new());
        let err = UserJwtFilter.filter(&mut ctx).await.unwrap_err();
        assert!(matches!(err, SidecarError::Authentication(_)));
    }

    #[tokio::test]
    async fn malformed_user_token_tolerated_with_system_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer not-a-jwt"),
        );
        let mut ctx = ctx(headers);
        ctx.system_claims = Some(claims("acme"));

        UserJwtFilter.filter(&mut ctx).await.unwrap();
        assert!(ctx.user_claims.is_none());
    }

    #[tokio::test]
    async fn malformed_user_token_fatal_without_system_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer not-a-jwt"),
        );
        let mut ctx = ctx(headers);

        assert!(UserJwtFilter.filter(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn parses_valid_user_token() {
        let token = encode_unsigned(&claims("acme"));
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        let mut ctx = ctx(headers);

        UserJwtFilter.filter(&mut ctx).await.unwrap();
        assert_eq!(ctx.user_claims.as_ref().unwrap().sub, "user-1");
        assert_eq!(ctx.user_token.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn tenant_conflict_rejected_unless_cross_tenant() {
        let mut ctx_conflict = ctx(HeaderMap::new());
        ctx_conflict.user_claims = Some(claims("acme"));
        ctx_conflict.system_claims = Some(claims("globex"));

        let strict = TenantResolutionFilter::new(false);
        assert!(strict.filter(&mut ctx_conflict).await.is_err());

        let mut ctx_cross = ctx(HeaderMap::new());
        ctx_cross.user_claims = Some(claims("acme"));
        ctx_cross.system_claims = Some(claims("globex"));
        let tolerant = TenantResolutionFilter::new(true);
        tolerant.filter(&mut ctx_cross).await.unwrap();
        assert_eq!(ctx_cross.tenant.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn tenant_resolution_stamps_header() {
        let mut c = ctx(HeaderMap::new());
        c.user_claims = Some(claims("acme"));
        TenantResolutionFilter::new(false).filter(&mut c).await.unwrap();
        assert_eq!(c.tenant.as_deref(), Some("acme"));
        assert_eq!(c.header(HEADER_TENANT), Some("acme"));
    }

    #[tokio::test]
    async fn tenant_enabled_gate() {
        let registry = Arc::new(TenantRegistry::new());
        let filter = TenantEnabledFilter::new(Arc::clone(&registry));

        let mut c = ctx(HeaderMap::new());
        c.tenant = Some("acme".into());
        assert!(matches!(
            filter.filter(&mut c).await,
            Err(SidecarError::UnknownTenant(_))
        ));

        registry.set_enabled("acme", false);
        assert!(matches!(
            filter.filter(&mut c).await,
            Err(SidecarError::TenantDisabled(_))
        ));

        registry.set_enabled("acme", true);
        filter.filter(&mut c).await.unwrap();
    }
}
