//! Introspection verdict cache.
//!
//! # Responsibilities
//! - Cache identity-provider introspection verdicts per token
//! - Expire verdicts at the token's own `exp`, or a configured default when
//!   the verdict carries no expiry
//! - Flip verdicts to "inactive" on logout without evicting them
//!
//! # Design Decisions
//! - Keys encode tenant, user, and session so logout and tenant events can
//!   target exactly the right entries
//! - Logout marks entries inactive in place: a token already known revoked
//!   must not trigger a fresh introspection for its remaining lifetime

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::jwt::{now_epoch_secs, Claims};
use crate::error::SidecarError;
use crate::external::{IdentityProvider, Introspection};
use crate::token::cache::ExpiringCache;
use crate::token::{clamped_expiry, token_hash};

/// Cache key for one introspection verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerdictKey {
    pub tenant: String,
    pub user: String,
    pub session: Option<String>,
    pub token_hash: String,
}

/// Caches introspection verdicts for their computed lifetime.
pub struct IntrospectionCache {
    idp: Arc<dyn IdentityProvider>,
    /// Lifetime for verdicts that carry no expiry of their own.
    default_ttl: Duration,
    verdicts: ExpiringCache<VerdictKey, Introspection>,
}

impl IntrospectionCache {
    pub fn new(idp: Arc<dyn IdentityProvider>, default_ttl: Duration) -> Self {
        Self {
            idp,
            default_ttl,
            verdicts: ExpiringCache::new("introspection"),
        }
    }

    fn expiry_of(&self, verdict: &Introspection) -> Option<Instant> {
        match verdict.exp {
            Some(exp) => Some(clamped_expiry(exp.saturating_sub(now_epoch_secs()))),
            // No expiry from the provider: treat as a short-lived verdict.
            None => Some(Instant::now() + self.default_ttl),
        }
    }

    /// Current verdict for a token, cached per its computed lifetime.
    pub async fn verdict(
        &self,
        tenant: &str,
        claims: &Claims,
        token: &str,
    ) -> Result<Introspection, SidecarError> {
        let key = VerdictKey {
            tenant: tenant.to_string(),
            user: claims.sub.clone(),
            session: claims.sid.clone(),
            token_hash: token_hash(token),
        };

        let idp = Arc::clone(&self.idp);
        let token = token.to_string();
        self.verdicts
            .get_or_try_load(
                key,
                |verdict| self.expiry_of(verdict),
                || async move { idp.introspect(&token).await },
            )
            .await
    }

    /// Single-session logout: mark only that user+session inactive.
    pub fn mark_session_inactive(&self, user: &str, session: &str) {
        self.verdicts.update_matching(
            |key| key.user == user && key.session.as_deref() == Some(session),
            |verdict| verdict.active = false,
        );
    }

    /// Logout-all: mark every session of the user inactive.
    pub fn mark_user_inactive(&self, user: &str) {
        self.verdicts
            .update_matching(|key| key.user == user, |verdict| verdict.active = false);
    }

    /// Evict every verdict for a tenant.
    pub fn invalidate_tenant(&self, tenant: &str) {
        self.verdicts.invalidate_matching(|key| key.tenant == tenant);
    }
}
