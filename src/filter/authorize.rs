//! Ingress authorization filters: impersonation, permission evaluation,
//! signature stamping, and desired-permission population.
//!
//! # Ordering
//! ```text
//!  700 impersonation         swap to a target-tenant user token
//!  800 authorization         evaluate endpoint permission (cached decision)
//!  900 signature             stamp the sidecar signature
//! 1000 desired permissions   populate the desired-permission header
//! ```
//!
//! Authorization runs after impersonation so it observes the effective
//! identity; the signature is stamped before the permission header so later
//! signature stripping cannot remove it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::jwt::decode_claims_offloaded;
use crate::context::{
    RequestContext, HEADER_PERMISSIONS_DESIRED, HEADER_REQUEST_ID, HEADER_SIDECAR_SIGNATURE,
};
use crate::error::SidecarError;
use crate::external::{GrantRequest, IdentityProvider};
use crate::filter::{Filter, IngressFilter};
use crate::token::credentials::CredentialCache;
use crate::token::decisions::DecisionCache;
use crate::token::introspection::IntrospectionCache;
use crate::token::token_hash;

pub const ORDER_IMPERSONATION: i32 = 700;
pub const ORDER_AUTHORIZATION: i32 = 800;
pub const ORDER_SIGNATURE: i32 = 900;
pub const ORDER_DESIRED_PERMISSIONS: i32 = 1000;

/// Permission name for an endpoint + method pair.
pub fn endpoint_permission(pattern: &str, method: &str) -> String {
    format!("{}#{}", pattern, method.to_uppercase())
}

/// Swaps the user identity when the token's issuer tenant differs from the
/// target tenant of the request.
pub struct ImpersonationFilter {
    idp: Arc<dyn IdentityProvider>,
    credentials: Arc<CredentialCache>,
    client_id: String,
}

impl ImpersonationFilter {
    pub fn new(
        idp: Arc<dyn IdentityProvider>,
        credentials: Arc<CredentialCache>,
        client_id: String,
    ) -> Self {
        Self { idp, credentials, client_id }
    }

    async fn exchange(
        &self,
        target_tenant: &str,
        subject_token: &str,
    ) -> Result<crate::token::Token, SidecarError> {
        let secret = self
            .credentials
            .client_secret(target_tenant, &self.client_id)
            .await?;
        let request = GrantRequest::TokenExchange {
            target_tenant: target_tenant.to_string(),
            subject_token: subject_token.to_string(),
            client_id: self.client_id.clone(),
            client_secret: secret,
        };

        match self.idp.grant(request).await {
            Ok(token) => Ok(token),
            Err(err) if err.is_credential_staleness_candidate() => {
                tracing::warn!(
                    tenant = %target_tenant,
                    "Token exchange rejected; clearing cached credential and retrying once"
                );
                self.credentials.invalidate_client(target_tenant, &self.client_id);
                let secret = self
                    .credentials
                    .client_secret(target_tenant, &self.client_id)
                    .await?;
                self.idp
                    .grant(GrantRequest::TokenExchange {
                        target_tenant: target_tenant.to_string(),
                        subject_token: subject_token.to_string(),
                        client_id: self.client_id.clone(),
                        client_secret: secret,
                    })
                    .await
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Filter for ImpersonationFilter {
    fn name(&self) -> &'static str {
        "impersonation"
    }

    fn order(&self) -> i32 {
        ORDER_IMPERSONATION
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.self_request || ctx.user_claims.is_none()
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let target_tenant = ctx
            .tenant
            .clone()
            .ok_or_else(|| SidecarError::Authentication("tenant not resolved".into()))?;
        let issuer_tenant = match &ctx.user_claims {
            Some(claims) => claims.issuer_tenant()?,
            None => return Ok(()),
        };
        if issuer_tenant == target_tenant {
            return Ok(());
        }

        let subject_token = ctx
            .user_token
            .clone()
            .ok_or_else(|| SidecarError::Authentication("user token missing".into()))?;
        let exchanged = self.exchange(&target_tenant, &subject_token).await?;
        let new_claims = decode_claims_offloaded(exchanged.access_token.clone()).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            from_tenant = %issuer_tenant,
            to_tenant = %target_tenant,
            token = %token_hash(&exchanged.access_token),
            "Impersonated user into target tenant"
        );
        ctx.replace_user_identity(exchanged.access_token, new_claims);
        Ok(())
    }
}

impl IngressFilter for ImpersonationFilter {}

/// Evaluates the endpoint-derived permission for the effective identity.
pub struct AuthorizationFilter {
    decisions: Arc<DecisionCache>,
    introspection: Arc<IntrospectionCache>,
}

impl AuthorizationFilter {
    pub fn new(decisions: Arc<DecisionCache>, introspection: Arc<IntrospectionCache>) -> Self {
        Self { decisions, introspection }
    }
}

#[async_trait]
impl Filter for AuthorizationFilter {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn order(&self) -> i32 {
        ORDER_AUTHORIZATION
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.self_request
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let tenant = ctx
            .tenant
            .clone()
            .ok_or_else(|| SidecarError::Authentication("tenant not resolved".into()))?;

        // A cached "inactive" verdict (logout) rejects without re-introspection.
        if let (Some(claims), Some(token)) = (&ctx.user_claims, &ctx.user_token) {
            let verdict = self.introspection.verdict(&tenant, claims, token).await?;
            if !verdict.active {
                return Err(SidecarError::Authentication("token is no longer active".into()));
            }
        }

        let entry = match &ctx.routing {
            Some(entry) => Arc::clone(entry),
            None => return Ok(()),
        };
        if entry.endpoint.permissions_required.is_empty() {
            return Ok(());
        }

        // The possibly-impersonated user identity wins over the system one.
        let (claims, token) = match (&ctx.user_claims, &ctx.user_token) {
            (Some(claims), Some(token)) => (claims, token),
            _ => match (&ctx.system_claims, &ctx.system_token) {
                (Some(claims), Some(token)) => (claims, token),
                _ => {
                    return Err(SidecarError::Authentication(
                        "endpoint requires permissions but no token is present".into(),
                    ))
                }
            },
        };

        let permission =
            endpoint_permission(&entry.endpoint.path_pattern, ctx.method.as_str());
        let allowed = self
            .decisions
            .evaluate(&tenant, claims, token, &permission)
            .await?;
        if allowed {
            Ok(())
        } else {
            Err(SidecarError::Authorization { permission })
        }
    }
}

impl IngressFilter for AuthorizationFilter {}

/// Stamps the sidecar signature and ensures the request id header.
///
/// Runs for self-requests too; only tenant/authorization work is skipped on
/// the trusted loopback path.
pub struct SignatureFilter {
    signature: Arc<str>,
}

impl SignatureFilter {
    pub fn new(signature: Arc<str>) -> Self {
        Self { signature }
    }
}

#[async_trait]
impl Filter for SignatureFilter {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn order(&self) -> i32 {
        ORDER_SIGNATURE
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let signature = self.signature.to_string();
        let request_id = ctx.request_id.clone();
        ctx.set_header(HEADER_SIDECAR_SIGNATURE, &signature);
        ctx.set_header(HEADER_REQUEST_ID, &request_id);
        Ok(())
    }
}

impl IngressFilter for SignatureFilter {}

/// Populates the desired-permissions header from the caller's permissions.
pub struct DesiredPermissionsFilter {
    idp: Arc<dyn IdentityProvider>,
}

impl DesiredPermissionsFilter {
    pub fn new(idp: Arc<dyn IdentityProvider>) -> Self {
        Self { idp }
    }
}

#[async_trait]
impl Filter for DesiredPermissionsFilter {
    fn name(&self) -> &'static str {
        "desired_permissions"
    }

    fn order(&self) -> i32 {
        ORDER_DESIRED_PERMISSIONS
    }

    fn should_skip(&self, ctx: &RequestContext) -> bool {
        ctx.user_token.is_none()
            || ctx
                .routing
                .as_ref()
                .map_or(true, |entry| entry.endpoint.permissions_desired.is_empty())
    }

    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        let desired = match &ctx.routing {
            Some(entry) => entry.endpoint.permissions_desired.clone(),
            None => return Ok(()),
        };
        let tenant = ctx
            .tenant
            .clone()
            .ok_or_else(|| SidecarError::Authentication("tenant not resolved".into()))?;
        let token = match ctx.user_token.clone() {
            Some(token) => token,
            None => return Ok(()),
        };

        let held = self.idp.user_permissions(&tenant, &token).await?;
        let granted: Vec<String> = held
            .into_iter()
            .filter(|permission| desired.iter().any(|prefix| permission.starts_with(prefix)))
            .collect();

        if !granted.is_empty() {
            ctx.set_header(HEADER_PERMISSIONS_DESIRED, &granted.join(","));
        }
        Ok(())
    }
}

impl IngressFilter for DesiredPermissionsFilter {}
