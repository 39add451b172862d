//! Event payloads and invalidation entry points.
//!
//! # Responsibilities
//! - Track which tenants are known/enabled (driven by entitlement events)
//! - React to discovery, entitlement, and logout events
//!
//! # Design Decisions
//! - The core exposes plain async functions; the pub/sub transport that
//!   delivers events lives outside this crate and simply calls them
//! - Route tables are rebuilt off to the side and published atomically

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::error::SidecarError;
use crate::external::ModuleDiscovery;
use crate::resilience::retry_idempotent;
use crate::routing::table::{RouteTable, RouteTables};
use crate::token::credentials::CredentialCache;
use crate::token::decisions::DecisionCache;
use crate::token::introspection::IntrospectionCache;
use crate::token::service::ServiceTokenCache;

/// Entitlement state of a tenant as this sidecar knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Unknown,
    Enabled,
    Disabled,
}

/// Known tenants and their enabled state, maintained by entitlement events.
#[derive(Default)]
pub struct TenantRegistry {
    tenants: DashMap<String, bool>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, tenant: &str, enabled: bool) {
        self.tenants.insert(tenant.to_string(), enabled);
    }

    pub fn remove(&self, tenant: &str) {
        self.tenants.remove(tenant);
    }

    pub fn status(&self, tenant: &str) -> TenantStatus {
        match self.tenants.get(tenant) {
            Some(enabled) if *enabled => TenantStatus::Enabled,
            Some(_) => TenantStatus::Disabled,
            None => TenantStatus::Unknown,
        }
    }
}

/// Payload: a module's discovery data changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryChanged {
    pub module_id: String,
}

/// Kind of entitlement change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementChangeType {
    Entitle,
    Upgrade,
    Revoke,
}

/// Payload: a tenant's entitlement to a module changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementChanged {
    pub module_id: String,
    pub tenant: String,
    #[serde(rename = "type")]
    pub change_type: EntitlementChangeType,
}

/// Scope of a logout event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogoutScope {
    Logout,
    LogoutAll,
}

/// Payload: a user logged out of one session, or of all of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutEvent {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub scope: LogoutScope,
}

/// Reacts to platform events by refreshing routes and invalidating caches.
pub struct EventHandler {
    module_id: String,
    discovery: Arc<dyn ModuleDiscovery>,
    retry: RetryConfig,
    tables: Arc<RouteTables>,
    registry: Arc<TenantRegistry>,
    credentials: Arc<CredentialCache>,
    service_tokens: Arc<ServiceTokenCache>,
    decisions: Arc<DecisionCache>,
    introspection: Arc<IntrospectionCache>,
    /// Dependency module ids from the bootstrap record; the egress table is
    /// the union of their descriptors.
    dependencies: RwLock<Vec<String>>,
}

impl EventHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        module_id: String,
        discovery: Arc<dyn ModuleDiscovery>,
        retry: RetryConfig,
        tables: Arc<RouteTables>,
        registry: Arc<TenantRegistry>,
        credentials: Arc<CredentialCache>,
        service_tokens: Arc<ServiceTokenCache>,
        decisions: Arc<DecisionCache>,
        introspection: Arc<IntrospectionCache>,
    ) -> Self {
        Self {
            module_id,
            discovery,
            retry,
            tables,
            registry,
            credentials,
            service_tokens,
            decisions,
            introspection,
            dependencies: RwLock::new(Vec::new()),
        }
    }

    /// Bootstrap: build both route tables from discovery and remember the
    /// dependency list for later targeted refreshes.
    pub async fn bootstrap(&self, required_modules: Vec<String>) -> Result<(), SidecarError> {
        let own = retry_idempotent(&self.retry, "bootstrap discovery", || {
            self.discovery.descriptor(&self.module_id)
        })
        .await?;
        self.tables.publish_ingress(RouteTable::from_descriptor(&own));

        let mut descriptors = Vec::with_capacity(required_modules.len());
        for dependency in &required_modules {
            let descriptor = retry_idempotent(&self.retry, "bootstrap discovery", || {
                self.discovery.descriptor(dependency)
            })
            .await?;
            descriptors.push(descriptor);
        }
        self.tables.publish_egress(RouteTable::from_descriptors(&descriptors));

        *self.dependencies.write().unwrap_or_else(|e| e.into_inner()) = required_modules;
        Ok(())
    }

    /// Targeted refresh after a discovery-changed event.
    pub async fn refresh_routes_for_module(&self, module_id: &str) -> Result<(), SidecarError> {
        if module_id == self.module_id {
            let own = retry_idempotent(&self.retry, "discovery refresh", || {
                self.discovery.descriptor(module_id)
            })
            .await?;
            self.tables.publish_ingress(RouteTable::from_descriptor(&own));
            return Ok(());
        }

        let dependencies = self
            .dependencies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if !dependencies.iter().any(|d| d == module_id) {
            tracing::debug!(module_id = %module_id, "Discovery change for unrelated module ignored");
            return Ok(());
        }

        // One dependency changed; the egress table is replaced wholesale.
        let mut descriptors = Vec::with_capacity(dependencies.len());
        for dependency in &dependencies {
            let descriptor = retry_idempotent(&self.retry, "discovery refresh", || {
                self.discovery.descriptor(dependency)
            })
            .await?;
            descriptors.push(descriptor);
        }
        self.tables.publish_egress(RouteTable::from_descriptors(&descriptors));
        Ok(())
    }

    /// React to a discovery-changed event.
    pub async fn handle_discovery_changed(&self, event: DiscoveryChanged) -> Result<(), SidecarError> {
        self.refresh_routes_for_module(&event.module_id).await
    }

    /// React to an entitlement change: tenant enable/disable plus
    /// tenant-scoped cache sync.
    pub async fn handle_entitlement_changed(
        &self,
        event: EntitlementChanged,
    ) -> Result<(), SidecarError> {
        match event.change_type {
            EntitlementChangeType::Entitle | EntitlementChangeType::Upgrade => {
                self.registry.set_enabled(&event.tenant, true);
            }
            EntitlementChangeType::Revoke => {
                self.registry.set_enabled(&event.tenant, false);
                self.invalidate_tenant(&event.tenant);
            }
        }
        self.refresh_routes_for_module(&event.module_id).await
    }

    /// React to a logout event per its scope.
    pub fn handle_logout(&self, event: LogoutEvent) {
        match event.scope {
            LogoutScope::Logout => match &event.session_id {
                Some(session) => self.invalidate_session(&event.user_id, session),
                None => self.invalidate_user(&event.user_id),
            },
            LogoutScope::LogoutAll => self.invalidate_user(&event.user_id),
        }
    }

    /// Evict a tenant's entries from every cache kind.
    pub fn invalidate_tenant(&self, tenant: &str) {
        tracing::info!(tenant = %tenant, "Invalidating all tenant-scoped cache entries");
        self.credentials.invalidate_tenant(tenant);
        self.service_tokens.invalidate_tenant(tenant);
        self.decisions.invalidate_tenant(tenant);
        self.introspection.invalidate_tenant(tenant);
    }

    /// Mark all of a user's cached verdicts inactive.
    pub fn invalidate_user(&self, user: &str) {
        self.introspection.mark_user_inactive(user);
    }

    /// Mark one user session's cached verdicts inactive.
    pub fn invalidate_session(&self, user: &str, session: &str) {
        self.introspection.mark_session_inactive(user, session);
    }
}
