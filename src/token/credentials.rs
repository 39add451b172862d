//! Credential cache over the external secure store.
//!
//! # Responsibilities
//! - Memoize client secrets and system-user passwords
//! - Namespace keys by tenant so tenant-scoped events can evict them
//!
//! # Design Decisions
//! - Pure memoization: entries never expire, they are invalidated explicitly
//!   (secret rotation is handled by the clear-and-retry-once path in the
//!   token issuers)
//! - One store fetch in flight per key

use std::sync::Arc;

use crate::error::SidecarError;
use crate::external::SecureStore;
use crate::token::cache::ExpiringCache;

/// Memoizing facade over the secure store.
pub struct CredentialCache {
    store: Arc<dyn SecureStore>,
    secrets: ExpiringCache<String, String>,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self {
            store,
            secrets: ExpiringCache::new("credentials"),
        }
    }

    fn client_key(tenant: &str, client_id: &str) -> String {
        format!("tenant/{}/client/{}", tenant, client_id)
    }

    fn user_key(tenant: &str, username: &str) -> String {
        format!("tenant/{}/user/{}", tenant, username)
    }

    /// Client secret for a module's identity in a tenant.
    pub async fn client_secret(
        &self,
        tenant: &str,
        client_id: &str,
    ) -> Result<String, SidecarError> {
        let key = Self::client_key(tenant, client_id);
        let store = Arc::clone(&self.store);
        let fetch_key = key.clone();
        self.secrets
            .get_or_try_load(key, |_| None, || async move { store.get(&fetch_key).await })
            .await
    }

    /// System-user password for a tenant.
    pub async fn system_user_password(
        &self,
        tenant: &str,
        username: &str,
    ) -> Result<String, SidecarError> {
        let key = Self::user_key(tenant, username);
        let store = Arc::clone(&self.store);
        let fetch_key = key.clone();
        self.secrets
            .get_or_try_load(key, |_| None, || async move { store.get(&fetch_key).await })
            .await
    }

    /// Drop one client secret (rotation, auth failure).
    pub fn invalidate_client(&self, tenant: &str, client_id: &str) {
        self.secrets.invalidate(&Self::client_key(tenant, client_id));
    }

    /// Drop one system-user password.
    pub fn invalidate_user(&self, tenant: &str, username: &str) {
        self.secrets.invalidate(&Self::user_key(tenant, username));
    }

    /// Drop everything cached for a tenant.
    pub fn invalidate_tenant(&self, tenant: &str) {
        let prefix = format!("tenant/{}/", tenant);
        self.secrets.invalidate_matching(|key| key.starts_with(&prefix));
    }

    #[cfg(test)]
    pub(crate) fn cached_entries(&self) -> usize {
        self.secrets.len()
    }
}
