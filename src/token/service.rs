//! Service and system-user token caches.
//!
//! # Responsibilities
//! - Serve one module-to-module (service) token per tenant
//! - Serve one system-user token per tenant
//! - Never hand out a token in its final seconds of validity
//!
//! # Design Decisions
//! - Cache expiry is `expires_in − refresh_before_expiry`; when that margin
//!   drops below the configured minimum (≥ 30 s) the expiry becomes
//!   `expires_in` reduced by 10 % (at least 1 s) instead
//! - An authentication failure during a grant clears the implicated cached
//!   credential and retries exactly once (secret rotation/drift)

use std::sync::Arc;
use std::time::Instant;

use crate::config::TokenCacheConfig;
use crate::error::SidecarError;
use crate::external::{GrantRequest, IdentityProvider};
use crate::token::cache::ExpiringCache;
use crate::token::credentials::CredentialCache;
use crate::token::{clamped_expiry, token_hash, Token};

/// Seconds a token of `expires_in` stays cached.
///
/// `refresh_before` and `min_margin` come from [`TokenCacheConfig`].
pub fn cache_lifetime_secs(expires_in: u64, refresh_before: u64, min_margin: u64) -> u64 {
    let margin = expires_in.saturating_sub(refresh_before);
    if margin >= min_margin {
        margin
    } else {
        expires_in.saturating_sub((expires_in / 10).max(1))
    }
}

/// Per-tenant caches for service and system-user tokens.
pub struct ServiceTokenCache {
    idp: Arc<dyn IdentityProvider>,
    credentials: Arc<CredentialCache>,
    config: TokenCacheConfig,
    /// Client this sidecar authenticates as (the hosted module's id).
    client_id: String,
    /// System user the sidecar falls back to for token-less egress.
    system_username: String,
    service: ExpiringCache<String, Token>,
    system_user: ExpiringCache<String, Token>,
}

impl ServiceTokenCache {
    pub fn new(
        idp: Arc<dyn IdentityProvider>,
        credentials: Arc<CredentialCache>,
        config: TokenCacheConfig,
        client_id: String,
        system_username: String,
    ) -> Self {
        Self {
            idp,
            credentials,
            config,
            client_id,
            system_username,
            service: ExpiringCache::new("service_tokens"),
            system_user: ExpiringCache::new("system_user_tokens"),
        }
    }

    fn expiry_of(&self, token: &Token) -> Option<Instant> {
        let secs = cache_lifetime_secs(
            token.expires_in,
            self.config.refresh_before_expiry_secs,
            self.config.min_refresh_margin_secs,
        );
        Some(clamped_expiry(secs))
    }

    /// Service (module-to-module) token for a tenant.
    pub async fn service_token(&self, tenant: &str) -> Result<Token, SidecarError> {
        let tenant_owned = tenant.to_string();
        self.service
            .get_or_try_load(
                tenant_owned.clone(),
                |token| self.expiry_of(token),
                || self.grant_service_token(tenant_owned.clone()),
            )
            .await
    }

    /// System-user token for a tenant.
    pub async fn system_user_token(&self, tenant: &str) -> Result<Token, SidecarError> {
        let tenant_owned = tenant.to_string();
        self.system_user
            .get_or_try_load(
                tenant_owned.clone(),
                |token| self.expiry_of(token),
                || self.grant_system_user_token(tenant_owned.clone()),
            )
            .await
    }

    async fn grant_service_token(&self, tenant: String) -> Result<Token, SidecarError> {
        let secret = self.credentials.client_secret(&tenant, &self.client_id).await?;
        let request = GrantRequest::ClientCredentials {
            tenant: tenant.clone(),
            client_id: self.client_id.clone(),
            client_secret: secret,
        };

        match self.idp.grant(request).await {
            Ok(token) => {
                tracing::debug!(tenant = %tenant, token = %token_hash(&token.access_token), "Service token granted");
                Ok(token)
            }
            Err(err) if err.is_credential_staleness_candidate() => {
                // The cached secret may have rotated underneath us.
                tracing::warn!(tenant = %tenant, "Service grant rejected; clearing cached credential and retrying once");
                self.credentials.invalidate_client(&tenant, &self.client_id);
                let secret = self.credentials.client_secret(&tenant, &self.client_id).await?;
                self.idp
                    .grant(GrantRequest::ClientCredentials {
                        tenant,
                        client_id: self.client_id.clone(),
                        client_secret: secret,
                    })
                    .await
            }
            Err(err) => Err(err),
        }
    }

    async fn grant_system_user_token(&self, tenant: String) -> Result<Token, SidecarError> {
        let password = self
            .credentials
            .system_user_password(&tenant, &self.system_username)
            .await?;
        let request = GrantRequest::Password {
            tenant: tenant.clone(),
            username: self.system_username.clone(),
            password,
        };

        match self.idp.grant(request).await {
            Ok(token) => Ok(token),
            Err(err) if err.is_credential_staleness_candidate() => {
                tracing::warn!(tenant = %tenant, "System-user grant rejected; clearing cached password and retrying once");
                self.credentials.invalidate_user(&tenant, &self.system_username);
                let password = self
                    .credentials
                    .system_user_password(&tenant, &self.system_username)
                    .await?;
                self.idp
                    .grant(GrantRequest::Password {
                        tenant,
                        username: self.system_username.clone(),
                        password,
                    })
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Evict both token kinds for a tenant.
    pub fn invalidate_tenant(&self, tenant: &str) {
        self.service.invalidate(&tenant.to_string());
        self.system_user.invalidate(&tenant.to_string());
    }
}
