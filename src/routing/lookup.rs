//! Routing lookup strategies.
//!
//! # Data Flow
//! ```text
//! RequestContext (method, path, hint, tenant)
//!     → Ingress   (own declared endpoints)
//!     → Egress    (union of dependency endpoints)
//!     → Dynamic   (hint present, no static entry: discovery/entitlement)
//!     → Gateway   (configured fallback destination)
//! First non-empty result short-circuits the remaining strategies.
//! ```
//!
//! # Design Decisions
//! - Strategies share one contract and are composed into an explicit ordered
//!   list at startup; no runtime scanning
//! - Dynamic results are memoized per method+path for subsequent identical
//!   requests
//! - Discovery/entitlement fetches retry with bounded backoff (idempotent)

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use url::Url;

use crate::config::RetryConfig;
use crate::context::{RequestContext, HEADER_MODULE_ID, HEADER_TENANT};
use crate::error::SidecarError;
use crate::external::{ModuleDiscovery, TenantEntitlement};
use crate::observability::metrics as metric_names;
use crate::resilience::retry_idempotent;
use crate::routing::entry::{Endpoint, MethodSpec, RoutingEntry};
use crate::routing::table::RouteTables;

/// One strategy for resolving a request to a routing entry.
#[async_trait]
pub trait RoutingLookup: Send + Sync {
    /// Resolve the request, or yield to the next strategy with `Ok(None)`.
    async fn lookup_route(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<RoutingEntry>>, SidecarError>;
}

/// Matches against the hosted module's own declared endpoints.
pub struct IngressLookup {
    tables: Arc<RouteTables>,
}

impl IngressLookup {
    pub fn new(tables: Arc<RouteTables>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl RoutingLookup for IngressLookup {
    async fn lookup_route(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<RoutingEntry>>, SidecarError> {
        Ok(self
            .tables
            .ingress()
            .lookup(ctx.method.as_str(), &ctx.path, ctx.module_hint()))
    }
}

/// Matches against the union of all dependency modules' endpoints.
pub struct EgressLookup {
    tables: Arc<RouteTables>,
}

impl EgressLookup {
    pub fn new(tables: Arc<RouteTables>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl RoutingLookup for EgressLookup {
    async fn lookup_route(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<RoutingEntry>>, SidecarError> {
        Ok(self
            .tables
            .egress()
            .lookup(ctx.method.as_str(), &ctx.path, ctx.module_hint()))
    }
}

/// Resolves hinted requests that no static table covers.
pub struct DynamicLookup {
    discovery: Arc<dyn ModuleDiscovery>,
    entitlement: Arc<dyn TenantEntitlement>,
    retry: RetryConfig,
    /// Synthetic entries memoized per (method, path).
    resolved: DashMap<(String, String), Arc<RoutingEntry>>,
}

impl DynamicLookup {
    pub fn new(
        discovery: Arc<dyn ModuleDiscovery>,
        entitlement: Arc<dyn TenantEntitlement>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            discovery,
            entitlement,
            retry,
            resolved: DashMap::new(),
        }
    }

    /// A hint "encodes a version" when it ends in a dotted numeric suffix,
    /// e.g. `mod-orders-2.1.0`. A bare name like `mod-orders` does not.
    fn hint_has_version(hint: &str) -> bool {
        match hint.rsplit_once('-') {
            Some((_, suffix)) => {
                suffix.contains('.') && suffix.chars().next().is_some_and(|c| c.is_ascii_digit())
            }
            None => false,
        }
    }

    fn synthetic_entry(module_id: &str, base_location: Url, path: &str) -> RoutingEntry {
        RoutingEntry {
            module_id: module_id.to_string(),
            base_location,
            interface_id: "dynamic".to_string(),
            interface_type: None,
            endpoint: Endpoint {
                methods: MethodSpec::Any("*".to_string()),
                path_pattern: path.to_string(),
                permissions_required: vec![],
                permissions_desired: vec![],
            },
        }
    }

    async fn resolve(&self, ctx: &RequestContext, hint: &str) -> Result<RoutingEntry, SidecarError> {
        if Self::hint_has_version(hint) {
            // Versioned hint: the hint is the module id, resolve directly.
            let descriptor = retry_idempotent(&self.retry, "dynamic discovery", || {
                self.discovery.descriptor(hint)
            })
            .await?;
            return Ok(Self::synthetic_entry(
                &descriptor.module_id,
                descriptor.base_location,
                &ctx.path,
            ));
        }

        // Unversioned hint: find the entitled module the hint names. Lookup
        // runs before the filter chain, so fall back to the tenant header
        // when no filter has resolved the tenant yet.
        let tenant = ctx
            .tenant
            .as_deref()
            .or_else(|| ctx.header(HEADER_TENANT))
            .ok_or_else(|| {
                SidecarError::Validation("module hint requires a resolved tenant".into())
            })?;
        let entitled = retry_idempotent(&self.retry, "dynamic entitlement", || {
            self.entitlement.entitled_modules(tenant)
        })
        .await?;

        let module = entitled
            .iter()
            .find(|m| m.module_id.starts_with(hint))
            .ok_or_else(|| {
                // An explicit hint must never fall through silently.
                SidecarError::TenantDisabled(format!(
                    "tenant {} has no entitled module matching hint {}",
                    tenant, hint
                ))
            })?;

        let descriptor = retry_idempotent(&self.retry, "dynamic discovery", || {
            self.discovery.descriptor(&module.module_id)
        })
        .await?;

        Ok(Self::synthetic_entry(
            &descriptor.module_id,
            descriptor.base_location,
            &ctx.path,
        ))
    }
}

#[async_trait]
impl RoutingLookup for DynamicLookup {
    async fn lookup_route(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<RoutingEntry>>, SidecarError> {
        let hint = match ctx.module_hint() {
            Some(hint) => hint.to_string(),
            None => return Ok(None),
        };

        let key = (ctx.method.as_str().to_string(), ctx.path.clone());
        if let Some(cached) = self.resolved.get(&key) {
            return Ok(Some(Arc::clone(&cached)));
        }

        let entry = Arc::new(self.resolve(ctx, &hint).await?);
        self.resolved.insert(key, Arc::clone(&entry));
        tracing::debug!(
            module_id = %entry.module_id,
            path = %ctx.path,
            "Dynamic lookup resolved synthetic entry"
        );
        Ok(Some(entry))
    }
}

/// Last-resort strategy pointing at the configured gateway.
pub struct GatewayLookup {
    base_location: Url,
}

impl GatewayLookup {
    pub fn new(base_location: Url) -> Self {
        Self { base_location }
    }
}

#[async_trait]
impl RoutingLookup for GatewayLookup {
    async fn lookup_route(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<RoutingEntry>>, SidecarError> {
        // Annotate with any module-id header even though nothing matched.
        let module_id = ctx.header(HEADER_MODULE_ID).unwrap_or("gateway");
        Ok(Some(Arc::new(RoutingEntry {
            module_id: module_id.to_string(),
            base_location: self.base_location.clone(),
            interface_id: "gateway".to_string(),
            interface_type: None,
            endpoint: Endpoint {
                methods: MethodSpec::Any("*".to_string()),
                path_pattern: ctx.path.clone(),
                permissions_required: vec![],
                permissions_desired: vec![],
            },
        })))
    }
}

/// Ordered, short-circuiting strategy list.
pub struct LookupChain {
    strategies: Vec<Arc<dyn RoutingLookup>>,
}

impl LookupChain {
    pub fn new(strategies: Vec<Arc<dyn RoutingLookup>>) -> Self {
        Self { strategies }
    }

    /// Try each strategy in order; the first non-empty result wins.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Arc<RoutingEntry>>, SidecarError> {
        for strategy in &self.strategies {
            if let Some(entry) = strategy.lookup_route(ctx).await? {
                metrics::counter!(metric_names::ROUTE_MATCHES_TOTAL).increment(1);
                return Ok(Some(entry));
            }
        }
        metrics::counter!(metric_names::ROUTE_MISSES_TOTAL).increment(1);
        Ok(None)
    }
}
