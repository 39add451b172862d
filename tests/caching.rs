//! Cache behavior across the token subsystem: value-derived lifetimes,
//! logout sentinels, tenant-scoped invalidation, and the stale-credential
//! retry path.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{descriptor, make_token, now_epoch_secs, MockDiscovery, MockIdp, MockSecureStore};
use sidecar_proxy::auth::jwt::Claims;
use sidecar_proxy::config::{RetryConfig, TokenCacheConfig};
use sidecar_proxy::events::{
    EntitlementChangeType, EntitlementChanged, EventHandler, LogoutEvent, LogoutScope,
    TenantRegistry, TenantStatus,
};
use sidecar_proxy::routing::RouteTables;
use sidecar_proxy::token::credentials::CredentialCache;
use sidecar_proxy::token::decisions::DecisionCache;
use sidecar_proxy::token::introspection::IntrospectionCache;
use sidecar_proxy::token::service::ServiceTokenCache;

const MODULE_ID: &str = "mod-orders-2.1.0";

fn claims(sub: &str, tenant: &str, sid: Option<&str>) -> Claims {
    Claims {
        sub: sub.to_string(),
        iss: format!("https://idp.platform.local/realms/{}", tenant),
        exp: now_epoch_secs() + 600,
        sid: sid.map(str::to_string),
        tenant: None,
    }
}

fn store_for(tenant: &str) -> Arc<MockSecureStore> {
    let store = Arc::new(MockSecureStore::new());
    store.put(&format!("tenant/{}/client/{}", tenant, MODULE_ID), "s3cret");
    store.put(&format!("tenant/{}/user/{}", tenant, MODULE_ID), "pa55word");
    store
}

fn service_cache(idp: Arc<MockIdp>, store: Arc<MockSecureStore>) -> Arc<ServiceTokenCache> {
    Arc::new(ServiceTokenCache::new(
        idp,
        Arc::new(CredentialCache::new(store)),
        TokenCacheConfig::default(),
        MODULE_ID.to_string(),
        MODULE_ID.to_string(),
    ))
}

#[tokio::test]
async fn service_token_is_reused_within_its_lifetime() {
    let idp = Arc::new(MockIdp::new(600));
    let cache = service_cache(idp.clone(), store_for("acme"));

    let first = cache.service_token("acme").await.unwrap();
    let second = cache.service_token("acme").await.unwrap();

    assert_eq!(first.access_token, second.access_token);
    assert_eq!(idp.grants.load(Ordering::SeqCst), 1);

    // A different tenant is a different cache entry.
    cache.service_token("globex").await.unwrap_err();
    let cache = service_cache(idp.clone(), store_for("globex"));
    cache.service_token("globex").await.unwrap();
    assert_eq!(idp.grants.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn short_lived_token_is_refreshed_after_fallback_expiry() {
    // expires_in − refresh margin < 30s, so the fallback lifetime
    // (expires_in reduced by 10%, at least 1s) applies: 2s − max(0.2s, 1s)
    // floors the cached lifetime to 1s.
    let idp = Arc::new(MockIdp::new(2));
    let cache = service_cache(idp.clone(), store_for("acme"));

    let first = cache.service_token("acme").await.unwrap();
    assert_eq!(idp.grants.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let second = cache.service_token("acme").await.unwrap();
    assert_eq!(idp.grants.load(Ordering::SeqCst), 2);
    assert_ne!(first.access_token, second.access_token);
}

#[tokio::test]
async fn stale_credential_clears_and_retries_once() {
    let idp = Arc::new(MockIdp::new(600));
    idp.fail_next_grant.store(true, Ordering::SeqCst);

    let store = store_for("acme");
    let cache = service_cache(idp.clone(), store.clone());

    // First grant fails with an authentication error; the cache clears the
    // memoized secret, re-reads it, and retries exactly once.
    let token = cache.service_token("acme").await.unwrap();
    assert!(!token.access_token.is_empty());
    assert_eq!(idp.grants.load(Ordering::SeqCst), 2);
    assert_eq!(store.gets.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn logout_marks_the_session_inactive_without_reintrospection() {
    let idp = Arc::new(MockIdp::new(600));
    let cache = IntrospectionCache::new(idp.clone(), Duration::from_secs(60));

    let user = claims("user-1", "acme", Some("sess-1"));
    let token = make_token("user-1", "acme", Some("sess-1"), now_epoch_secs() + 600);

    let verdict = cache.verdict("acme", &user, &token).await.unwrap();
    assert!(verdict.active);
    assert_eq!(idp.introspections.load(Ordering::SeqCst), 1);

    // Logout: the cached verdict flips in place, no eviction.
    cache.mark_session_inactive("user-1", "sess-1");

    let verdict = cache.verdict("acme", &user, &token).await.unwrap();
    assert!(!verdict.active);
    assert_eq!(idp.introspections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn logout_scoping_spares_other_sessions() {
    let idp = Arc::new(MockIdp::new(600));
    let cache = IntrospectionCache::new(idp.clone(), Duration::from_secs(60));

    let exp = now_epoch_secs() + 600;
    let session_a = claims("user-1", "acme", Some("sess-a"));
    let token_a = make_token("user-1", "acme", Some("sess-a"), exp);
    let session_b = claims("user-1", "acme", Some("sess-b"));
    let token_b = make_token("user-1", "acme", Some("sess-b"), exp);
    let other_user = claims("user-2", "acme", Some("sess-c"));
    let token_c = make_token("user-2", "acme", Some("sess-c"), exp);

    cache.verdict("acme", &session_a, &token_a).await.unwrap();
    cache.verdict("acme", &session_b, &token_b).await.unwrap();
    cache.verdict("acme", &other_user, &token_c).await.unwrap();

    cache.mark_session_inactive("user-1", "sess-a");
    assert!(!cache.verdict("acme", &session_a, &token_a).await.unwrap().active);
    assert!(cache.verdict("acme", &session_b, &token_b).await.unwrap().active);

    // Logout-all covers every session of the user, nobody else's.
    cache.mark_user_inactive("user-1");
    assert!(!cache.verdict("acme", &session_b, &token_b).await.unwrap().active);
    assert!(cache.verdict("acme", &other_user, &token_c).await.unwrap().active);
}

#[tokio::test]
async fn decisions_are_cached_per_permission_and_token() {
    let idp = Arc::new(MockIdp::new(600));
    let cache = DecisionCache::new(idp.clone());

    let user = claims("user-1", "acme", Some("sess-1"));
    let token = make_token("user-1", "acme", Some("sess-1"), user.exp);

    assert!(cache.evaluate("acme", &user, &token, "orders.item.get").await.unwrap());
    assert!(cache.evaluate("acme", &user, &token, "orders.item.get").await.unwrap());
    assert_eq!(idp.evaluations.load(Ordering::SeqCst), 1);

    // A different permission is a different decision.
    cache.evaluate("acme", &user, &token, "orders.item.put").await.unwrap();
    assert_eq!(idp.evaluations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn revocation_event_disables_tenant_and_flushes_its_caches() {
    let own = descriptor(
        MODULE_ID,
        "http://orders.platform.local:8081/",
        "orders",
        None,
        vec!["GET"],
        "/orders/{id}",
        vec![],
    );
    let discovery = Arc::new(MockDiscovery::new(vec![own]));
    let idp = Arc::new(MockIdp::new(600));
    let store = store_for("acme");
    let credentials = Arc::new(CredentialCache::new(store.clone()));
    let service_tokens = Arc::new(ServiceTokenCache::new(
        idp.clone(),
        credentials.clone(),
        TokenCacheConfig::default(),
        MODULE_ID.to_string(),
        MODULE_ID.to_string(),
    ));
    let decisions = Arc::new(DecisionCache::new(idp.clone()));
    let introspection = Arc::new(IntrospectionCache::new(
        idp.clone(),
        Duration::from_secs(60),
    ));
    let registry = Arc::new(TenantRegistry::new());
    registry.set_enabled("acme", true);

    let events = EventHandler::new(
        MODULE_ID.to_string(),
        discovery,
        RetryConfig::default(),
        Arc::new(RouteTables::new()),
        registry.clone(),
        credentials,
        service_tokens.clone(),
        decisions,
        introspection,
    );

    // Warm the service-token cache.
    service_tokens.service_token("acme").await.unwrap();
    assert_eq!(idp.grants.load(Ordering::SeqCst), 1);

    events
        .handle_entitlement_changed(EntitlementChanged {
            module_id: MODULE_ID.to_string(),
            tenant: "acme".to_string(),
            change_type: EntitlementChangeType::Revoke,
        })
        .await
        .unwrap();

    assert_eq!(registry.status("acme"), TenantStatus::Disabled);

    // Re-entitling forces a fresh grant: the old token is gone.
    registry.set_enabled("acme", true);
    service_tokens.service_token("acme").await.unwrap();
    assert_eq!(idp.grants.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn logout_event_routes_to_the_right_scope() {
    let idp = Arc::new(MockIdp::new(600));
    let introspection = Arc::new(IntrospectionCache::new(
        idp.clone(),
        Duration::from_secs(60),
    ));

    let own = descriptor(
        MODULE_ID,
        "http://orders.platform.local:8081/",
        "orders",
        None,
        vec!["GET"],
        "/orders/{id}",
        vec![],
    );
    let events = EventHandler::new(
        MODULE_ID.to_string(),
        Arc::new(MockDiscovery::new(vec![own])),
        RetryConfig::default(),
        Arc::new(RouteTables::new()),
        Arc::new(TenantRegistry::new()),
        Arc::new(CredentialCache::new(store_for("acme"))),
        service_cache(idp.clone(), store_for("acme")),
        Arc::new(DecisionCache::new(idp.clone())),
        introspection.clone(),
    );

    let exp = now_epoch_secs() + 600;
    let session_a = claims("user-1", "acme", Some("sess-a"));
    let token_a = make_token("user-1", "acme", Some("sess-a"), exp);
    let session_b = claims("user-1", "acme", Some("sess-b"));
    let token_b = make_token("user-1", "acme", Some("sess-b"), exp);

    introspection.verdict("acme", &session_a, &token_a).await.unwrap();
    introspection.verdict("acme", &session_b, &token_b).await.unwrap();

    events.handle_logout(LogoutEvent {
        user_id: "user-1".to_string(),
        session_id: Some("sess-a".to_string()),
        scope: LogoutScope::Logout,
    });
    assert!(!introspection.verdict("acme", &session_a, &token_a).await.unwrap().active);
    assert!(introspection.verdict("acme", &session_b, &token_b).await.unwrap().active);

    events.handle_logout(LogoutEvent {
        user_id: "user-1".to_string(),
        session_id: None,
        scope: LogoutScope::LogoutAll,
    });
    assert!(!introspection.verdict("acme", &session_b, &token_b).await.unwrap().active);
}
