//! Per-module network sidecar for a multi-tenant microservice platform.
//!
//! Each hosted module gets one sidecar. Inbound traffic from the gateway is
//! authenticated, authorized, and handed to the module; outbound calls from
//! the module are resolved, given service credentials, and forwarded.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   SIDECAR                     │
//!                        │                                               │
//!   Gateway Request      │  ┌─────────┐    ┌──────────┐    ┌─────────┐  │
//!   ─────────────────────┼─▶│ routing │───▶│ ingress  │───▶│forwarder│──┼──▶ Hosted
//!                        │  │ lookup  │    │ filters  │    │         │  │    Module
//!                        │  └─────────┘    └──────────┘    └─────────┘  │
//!                        │                                               │
//!   Module Egress Call   │  ┌─────────┐    ┌──────────┐    ┌─────────┐  │
//!   ─────────────────────┼─▶│ routing │───▶│ egress   │───▶│forwarder│──┼──▶ Other
//!                        │  │ lookup  │    │ filters  │    │         │  │    Sidecars
//!                        │  └─────────┘    └──────────┘    └─────────┘  │
//!                        │                                               │
//!                        │  ┌─────────────────────────────────────────┐ │
//!                        │  │          Cross-Cutting Concerns          │ │
//!                        │  │ ┌────────┐ ┌────────┐ ┌──────┐ ┌──────┐ │ │
//!                        │  │ │ config │ │ token  │ │events│ │obser-│ │ │
//!                        │  │ │        │ │ caches │ │      │ │vabil.│ │ │
//!                        │  │ └────────┘ └────────┘ └──────┘ └──────┘ │ │
//!                        │  │ ┌─────────────────┐ ┌─────────────────┐ │ │
//!                        │  │ │   resilience    │ │  auth (JWT)     │ │ │
//!                        │  │ │ retry/deadline  │ │                 │ │ │
//!                        │  │ └─────────────────┘ └─────────────────┘ │ │
//!                        │  └─────────────────────────────────────────┘ │
//!                        └──────────────────────────────────────────────┘
//! ```
//!
//! The crate is transport-agnostic: the embedding process supplies a
//! [`external::Forwarder`] plus implementations of the discovery,
//! entitlement, secret-store, and identity-provider traits, and drives
//! [`handler::RequestHandler::handle`] with one [`context::RequestContext`]
//! per request.

// Core subsystems
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod routing;

// Identity and credentials
pub mod auth;
pub mod token;

// Request processing
pub mod external;
pub mod filter;

// Cross-cutting concerns
pub mod events;
pub mod observability;
pub mod resilience;

pub use config::SidecarConfig;
pub use context::{Direction, RequestContext};
pub use error::{SidecarError, StructuredError, TenantErrorPolicy};
pub use handler::{HandlerOutcome, RequestHandler};
