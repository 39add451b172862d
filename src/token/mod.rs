//! Token and credential caching subsystem.
//!
//! # Data Flow
//! ```text
//! filter needs a token / decision / verdict
//!     → cache.rs (value-derived expiry, single-flight load)
//!     → miss: loader hits the secure store / identity provider
//!     → hit: cached value served until its computed expiry
//!
//! External events:
//!     tenant revoked   → evict tenant entries from every cache kind
//!     logout (session) → mark matching verdicts inactive in place
//!     logout-all       → mark all of the user's verdicts inactive
//! ```
//!
//! # Design Decisions
//! - Expiry is computed from the cached value (JWT exp, OAuth expires_in),
//!   never a fixed TTL constant
//! - One loader invocation per key; concurrent misses coalesce
//! - Access tokens never appear in logs; only a one-way hash does

pub mod cache;
pub mod credentials;
pub mod decisions;
pub mod introspection;
pub mod service;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ceiling on any cache entry lifetime. Expiries come from unverified token
/// claims and provider responses, so an absurd value is clamped, not trusted:
/// adding it to `Instant::now()` unclamped would overflow.
pub(crate) const MAX_CACHE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry instant `remaining_secs` from now, clamped to [`MAX_CACHE_LIFETIME`].
pub(crate) fn clamped_expiry(remaining_secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(remaining_secs).min(MAX_CACHE_LIFETIME)
}

/// An access token with optional refresh material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer access token.
    pub access_token: String,

    /// Refresh token, when the grant issued one.
    pub refresh_token: Option<String>,

    /// Validity in seconds from issuance.
    pub expires_in: u64,
}

impl Token {
    /// One-way hash of the access token for diagnostics.
    pub fn hash(&self) -> String {
        token_hash(&self.access_token)
    }
}

// Debug shows the hash, never the token itself.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &self.hash())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Short SHA-256 digest of a token, safe for log output.
pub fn token_hash(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
