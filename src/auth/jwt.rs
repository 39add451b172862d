//! JWT claim extraction.
//!
//! # Responsibilities
//! - Decode token headers and claims
//! - Extract tenant and session identity from claims
//! - Offload the CPU-bound decode to the blocking pool
//!
//! # Design Decisions
//! - Claims are decoded without local signature verification; validity is
//!   the identity provider's introspection concern at this boundary
//! - Expired tokens are rejected at parse time

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

/// Claims the sidecar consumes from platform tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user or client the token represents.
    pub sub: String,

    /// Issuer, e.g. "https://idp.platform.local/realms/acme".
    pub iss: String,

    /// Expiration, seconds since the epoch.
    pub exp: u64,

    /// Session id, present on user tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Explicit tenant claim, when the issuer stamps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl Claims {
    /// Tenant this token was issued for.
    ///
    /// The explicit `tenant` claim wins; otherwise the issuer realm
    /// (`…/realms/{tenant}`) is used.
    pub fn issuer_tenant(&self) -> Result<String, SidecarError> {
        if let Some(tenant) = &self.tenant {
            if !tenant.is_empty() {
                return Ok(tenant.clone());
            }
        }
        if let Some((_, realm)) = self.iss.rsplit_once("/realms/") {
            if !realm.is_empty() {
                return Ok(realm.trim_end_matches('/').to_string());
            }
        }
        Err(SidecarError::Authentication(
            "token carries no tenant claim and no realm issuer".into(),
        ))
    }

    /// True when the token has expired at `now` (epoch seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp <= now
    }
}

/// Decode a token's claims without verifying its signature.
pub fn decode_claims(token: &str) -> Result<Claims, SidecarError> {
    // Reject malformed compact serializations up front.
    jsonwebtoken::decode_header(token)
        .map_err(|e| SidecarError::Authentication(format!("malformed JWT header: {}", e)))?;

    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| SidecarError::Authentication("JWT has no payload segment".into()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| SidecarError::Authentication(format!("JWT payload is not base64url: {}", e)))?;

    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| SidecarError::Authentication(format!("JWT claims are not valid JSON: {}", e)))?;

    if claims.is_expired_at(now_epoch_secs()) {
        return Err(SidecarError::Authentication("token is expired".into()));
    }

    Ok(claims)
}

/// Decode claims on the blocking pool, keeping the event loop free.
pub async fn decode_claims_offloaded(token: String) -> Result<Claims, SidecarError> {
    tokio::task::spawn_blocking(move || decode_claims(&token))
        .await
        .map_err(|e| SidecarError::Upstream {
            context: "JWT decode task".into(),
            source: Some(Box::new(e)),
        })?
}

/// Current time as seconds since the epoch.
pub fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &Claims) -> String {
    // Test helper: alg=none-style token with an unverified signature segment.
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{}.{}.c2ln", header, payload)
}
