//! Resilience primitives: deadlines and bounded retries.
//!
//! # Design Decisions
//! - Retries apply only to idempotent read-style upstream calls
//!   (token/discovery/entitlement fetches), never the proxied request
//! - Timeouts are treated identically to call failures

pub mod deadline;
pub mod retry;

pub use deadline::{
    with_deadline, TimeboundDiscovery, TimeboundEntitlement, TimeboundForwarder,
    TimeboundIdentityProvider,
};
pub use retry::{backoff_delay, is_retryable, retry_idempotent};
