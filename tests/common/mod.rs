//! Shared mock collaborators for integration testing.
//!
//! Every external boundary gets a programmable in-memory implementation with
//! call counters, so tests can assert how often the sidecar actually went
//! upstream.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http::HeaderMap;

use sidecar_proxy::auth::jwt::Claims;
use sidecar_proxy::context::RequestContext;
use sidecar_proxy::external::{
    EntitledModule, ForwardedResponse, Forwarder, GrantRequest, IdentityProvider, Introspection,
    ModuleDescriptor, ModuleDiscovery, SecureStore, TenantEntitlement,
};
use sidecar_proxy::routing::entry::RoutingEntry;
use sidecar_proxy::token::Token;
use sidecar_proxy::SidecarError;

/// Current time as seconds since the epoch.
pub fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Unsigned platform-shaped JWT; the sidecar never verifies signatures
/// locally, so the trailing segment is filler.
pub fn make_token(sub: &str, tenant: &str, sid: Option<&str>, exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = Claims {
        sub: sub.to_string(),
        iss: format!("https://idp.platform.local/realms/{}", tenant),
        exp,
        sid: sid.map(str::to_string),
        tenant: None,
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
    format!("{}.{}.c2ln", header, payload)
}

/// Discovery service with a fixed descriptor set and a call counter.
pub struct MockDiscovery {
    descriptors: Mutex<HashMap<String, ModuleDescriptor>>,
    pub calls: AtomicU32,
}

impl MockDiscovery {
    pub fn new(descriptors: Vec<ModuleDescriptor>) -> Self {
        let map = descriptors
            .into_iter()
            .map(|d| (d.module_id.clone(), d))
            .collect();
        Self { descriptors: Mutex::new(map), calls: AtomicU32::new(0) }
    }

    pub fn insert(&self, descriptor: ModuleDescriptor) {
        self.descriptors
            .lock()
            .unwrap()
            .insert(descriptor.module_id.clone(), descriptor);
    }
}

#[async_trait]
impl ModuleDiscovery for MockDiscovery {
    async fn descriptor(&self, module_id: &str) -> Result<ModuleDescriptor, SidecarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.descriptors
            .lock()
            .unwrap()
            .get(module_id)
            .cloned()
            .ok_or_else(|| SidecarError::Upstream {
                context: format!("discovery has no module {}", module_id),
                source: None,
            })
    }
}

/// Entitlement service mapping tenant → entitled modules.
pub struct MockEntitlement {
    entitlements: Mutex<HashMap<String, Vec<EntitledModule>>>,
    pub calls: AtomicU32,
}

impl MockEntitlement {
    pub fn new() -> Self {
        Self { entitlements: Mutex::new(HashMap::new()), calls: AtomicU32::new(0) }
    }

    pub fn entitle(&self, tenant: &str, module_id: &str, application_id: &str) {
        self.entitlements
            .lock()
            .unwrap()
            .entry(tenant.to_string())
            .or_default()
            .push(EntitledModule {
                module_id: module_id.to_string(),
                application_id: application_id.to_string(),
            });
    }
}

#[async_trait]
impl TenantEntitlement for MockEntitlement {
    async fn entitled_modules(&self, tenant: &str) -> Result<Vec<EntitledModule>, SidecarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entitlements
            .lock()
            .unwrap()
            .get(tenant)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory secure store; `get` is counted so tests can assert memoization.
pub struct MockSecureStore {
    secrets: Mutex<HashMap<String, String>>,
    pub gets: AtomicU32,
}

impl MockSecureStore {
    pub fn new() -> Self {
        Self { secrets: Mutex::new(HashMap::new()), gets: AtomicU32::new(0) }
    }

    pub fn with_secret(key: &str, secret: &str) -> Self {
        let store = Self::new();
        store
            .secrets
            .lock()
            .unwrap()
            .insert(key.to_string(), secret.to_string());
        store
    }

    pub fn put(&self, key: &str, secret: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(key.to_string(), secret.to_string());
    }
}

#[async_trait]
impl SecureStore for MockSecureStore {
    async fn get(&self, key: &str) -> Result<String, SidecarError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SidecarError::Upstream {
                context: format!("secure store has no entry for {}", key),
                source: None,
            })
    }

    async fn set(&self, key: &str, secret: &str) -> Result<(), SidecarError> {
        self.put(key, secret);
        Ok(())
    }
}

/// Programmable identity provider.
///
/// Grants mint fresh unsigned tokens with a configurable lifetime so tests
/// can observe both cache hits (same token) and refreshes (new token).
pub struct MockIdp {
    pub token_lifetime_secs: u64,
    pub grants: AtomicU32,
    pub introspections: AtomicU32,
    pub evaluations: AtomicU32,
    /// Next grant fails with an authentication error, once.
    pub fail_next_grant: AtomicBool,
    /// Verdict handed out by `introspect`.
    pub active: AtomicBool,
    /// Answer for `evaluate_permission`.
    pub allow: AtomicBool,
    permissions: Mutex<Vec<String>>,
}

impl MockIdp {
    pub fn new(token_lifetime_secs: u64) -> Self {
        Self {
            token_lifetime_secs,
            grants: AtomicU32::new(0),
            introspections: AtomicU32::new(0),
            evaluations: AtomicU32::new(0),
            fail_next_grant: AtomicBool::new(false),
            active: AtomicBool::new(true),
            allow: AtomicBool::new(true),
            permissions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permissions(&self, permissions: Vec<String>) {
        *self.permissions.lock().unwrap() = permissions;
    }
}

#[async_trait]
impl IdentityProvider for MockIdp {
    async fn grant(&self, request: GrantRequest) -> Result<Token, SidecarError> {
        let n = self.grants.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_grant.swap(false, Ordering::SeqCst) {
            return Err(SidecarError::Authentication("invalid client secret".into()));
        }
        let tenant = request.tenant().to_string();
        let exp = now_epoch_secs() + self.token_lifetime_secs;
        Ok(Token {
            access_token: make_token(&format!("grant-{}", n), &tenant, None, exp),
            refresh_token: None,
            expires_in: self.token_lifetime_secs,
        })
    }

    async fn introspect(&self, _token: &str) -> Result<Introspection, SidecarError> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        Ok(Introspection {
            active: self.active.load(Ordering::SeqCst),
            exp: Some(now_epoch_secs() + self.token_lifetime_secs),
        })
    }

    async fn evaluate_permission(
        &self,
        _tenant: &str,
        _token: &str,
        _permission: &str,
    ) -> Result<bool, SidecarError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        Ok(self.allow.load(Ordering::SeqCst))
    }

    async fn user_permissions(
        &self,
        _tenant: &str,
        _token: &str,
    ) -> Result<Vec<String>, SidecarError> {
        Ok(self.permissions.lock().unwrap().clone())
    }
}

/// Forwarder that records what reached the destination.
pub struct MockForwarder {
    pub calls: AtomicU32,
    pub status: u16,
    seen: Mutex<Vec<(String, HeaderMap)>>,
}

impl MockForwarder {
    pub fn new(status: u16) -> Self {
        Self { calls: AtomicU32::new(0), status, seen: Mutex::new(Vec::new()) }
    }

    /// (module_id, headers) pairs in forwarding order.
    pub fn seen(&self) -> Vec<(String, HeaderMap)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for MockForwarder {
    async fn forward(
        &self,
        ctx: &RequestContext,
        entry: &RoutingEntry,
    ) -> Result<ForwardedResponse, SidecarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((entry.module_id.clone(), ctx.headers.clone()));
        Ok(ForwardedResponse {
            status: self.status,
            headers: HeaderMap::new(),
            body: b"ok".to_vec(),
        })
    }
}

/// Descriptor with one interface / one endpoint, enough for routing tests.
pub fn descriptor(
    module_id: &str,
    base: &str,
    interface_id: &str,
    interface_type: Option<&str>,
    methods: Vec<&str>,
    pattern: &str,
    permissions_required: Vec<&str>,
) -> ModuleDescriptor {
    ModuleDescriptor {
        module_id: module_id.to_string(),
        application_id: "app-platform".to_string(),
        base_location: base.parse().unwrap(),
        interfaces: vec![sidecar_proxy::external::InterfaceDescriptor {
            id: interface_id.to_string(),
            interface_type: interface_type.map(str::to_string),
            endpoints: vec![sidecar_proxy::external::EndpointDescriptor {
                methods: methods.into_iter().map(str::to_string).collect(),
                path_pattern: Some(pattern.to_string()),
                path: None,
                permissions_required: permissions_required
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                permissions_desired: vec![],
            }],
        }],
    }
}
