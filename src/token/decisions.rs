//! Authorization-decision cache.
//!
//! # Responsibilities
//! - Cache identity-provider permission evaluations
//! - Key decisions by permission + tenant + session + token expiry
//!
//! # Design Decisions
//! - A cached decision lives exactly as long as the JWT it was made for;
//!   a re-issued token (new exp) gets a fresh evaluation
//! - Tenant-scoped eviction drops every decision for that tenant

use std::sync::Arc;

use crate::auth::jwt::{now_epoch_secs, Claims};
use crate::error::SidecarError;
use crate::external::IdentityProvider;
use crate::token::cache::ExpiringCache;
use crate::token::clamped_expiry;

/// Cache key for one authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub permission: String,
    pub tenant: String,
    pub session: Option<String>,
    pub token_exp: u64,
}

/// Caches identity-provider permission evaluations per token lifetime.
pub struct DecisionCache {
    idp: Arc<dyn IdentityProvider>,
    decisions: ExpiringCache<DecisionKey, bool>,
}

impl DecisionCache {
    pub fn new(idp: Arc<dyn IdentityProvider>) -> Self {
        Self {
            idp,
            decisions: ExpiringCache::new("authorization_decisions"),
        }
    }

    /// Whether the token's bearer holds the permission in the tenant.
    ///
    /// The decision is cached until the token's own expiry.
    pub async fn evaluate(
        &self,
        tenant: &str,
        claims: &Claims,
        token: &str,
        permission: &str,
    ) -> Result<bool, SidecarError> {
        let key = DecisionKey {
            permission: permission.to_string(),
            tenant: tenant.to_string(),
            session: claims.sid.clone(),
            token_exp: claims.exp,
        };
        let expires_at = clamped_expiry(claims.exp.saturating_sub(now_epoch_secs()));

        let idp = Arc::clone(&self.idp);
        let (tenant, token, permission) =
            (tenant.to_string(), token.to_string(), permission.to_string());
        self.decisions
            .get_or_try_load(key, |_| Some(expires_at), || async move {
                idp.evaluate_permission(&tenant, &token, &permission).await
            })
            .await
    }

    /// Evict every decision made for a tenant.
    pub fn invalidate_tenant(&self, tenant: &str) {
        self.decisions.invalidate_matching(|key| key.tenant == tenant);
    }

    #[cfg(test)]
    pub(crate) fn cached_entries(&self) -> usize {
        self.decisions.len()
    }
}
