//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, module hint)
//!     → lookup.rs (strategy chain: ingress → egress → dynamic → gateway)
//!     → table.rs (prefix-bucketed candidate walk)
//!     → matcher.rs (method, pattern, hint disambiguation)
//!     → Return: matched RoutingEntry or no match
//!
//! Table construction (bootstrap / discovery / entitlement events):
//!     ModuleDescriptor[]
//!     → bucket by literal prefix
//!     → freeze as immutable RouteTable
//!     → publish via one atomic swap
//! ```
//!
//! # Design Decisions
//! - Tables are immutable snapshots; readers take one reference per lookup
//! - No regex in the hot path (prefix buckets + small backtracking matcher)
//! - Deterministic: same input always resolves the same entry
//! - First match wins (declaration order within a bucket)

pub mod entry;
pub mod lookup;
pub mod matcher;
pub mod table;

pub use entry::RoutingEntry;
pub use lookup::{
    DynamicLookup, EgressLookup, GatewayLookup, IngressLookup, LookupChain, RoutingLookup,
};
pub use table::{RouteTable, RouteTables};
