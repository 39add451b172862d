//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sidecar.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TenantErrorPolicy;

/// Root configuration for the sidecar.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SidecarConfig {
    /// Identity of the hosted module.
    pub module: ModuleConfig,

    /// Gateway fallback destination for unmatched egress traffic.
    pub gateway: GatewayConfig,

    /// Tenant handling.
    pub tenancy: TenancyConfig,

    /// Token cache tuning.
    pub token_cache: TokenCacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry/backoff configuration for idempotent upstream calls.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Identity of the module this sidecar fronts.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ModuleConfig {
    /// Module id, e.g. "mod-orders-2.1.0".
    pub module_id: String,

    /// Application the module belongs to.
    pub application_id: String,
}

/// Gateway fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Destination for requests no static or dynamic entry matches.
    /// When unset, unmatched requests surface as route-not-found.
    pub base_location: Option<Url>,
}

/// Tenant handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TenancyConfig {
    /// Allow tokens from several tenants within one request chain.
    pub allow_cross_tenant: bool,

    /// How tenant failures map to protocol statuses.
    pub error_policy: TenantErrorPolicy,
}

/// Token cache tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenCacheConfig {
    /// Seconds before token expiry at which a cached token is refreshed.
    pub refresh_before_expiry_secs: u64,

    /// Minimum acceptable refresh margin. When `expires_in −
    /// refresh_before_expiry_secs` falls below this, the fallback expiry
    /// (expires_in reduced by 10%, at least 1s) applies instead.
    pub min_refresh_margin_secs: u64,

    /// Default lifetime for cached introspection verdicts that carry no
    /// expiry of their own.
    pub introspection_default_ttl_secs: u64,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            refresh_before_expiry_secs: 60,
            min_refresh_margin_secs: 30,
            introspection_default_ttl_secs: 60,
        }
    }
}

/// Timeout configuration for upstream calls, applied by the deadline
/// decorators in [`crate::resilience::deadline`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Identity-provider call timeout in seconds.
    pub identity_provider_secs: u64,

    /// Discovery/entitlement call timeout in seconds.
    pub discovery_secs: u64,

    /// Forwarded request timeout in seconds.
    pub forward_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            identity_provider_secs: 10,
            discovery_secs: 10,
            forward_secs: 30,
        }
    }
}

/// Retry configuration for idempotent read-style upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum attempts (including the first).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_filter: "sidecar_proxy=debug".to_string() }
    }
}
