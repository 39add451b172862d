//! Metric names recorded through the `metrics` facade.
//!
//! # Metrics
//! - `sidecar_requests_total` (counter): requests by direction, status class
//! - `sidecar_request_duration_seconds` (histogram): end-to-end latency
//! - `sidecar_route_matches_total` / `sidecar_route_misses_total` (counter)
//! - `sidecar_route_table_swaps_total` (counter): table publications
//! - `sidecar_cache_hits_total` / `sidecar_cache_misses_total` (counter):
//!   by cache name
//! - `sidecar_filter_rejections_total` (counter): by filter name
//!
//! # Design Decisions
//! - The crate never installs a recorder; the embedding process decides
//!   whether and how the facade is exported
//! - Labels are low-cardinality (direction, status class, cache name)

pub const REQUESTS_TOTAL: &str = "sidecar_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "sidecar_request_duration_seconds";
pub const ROUTE_MATCHES_TOTAL: &str = "sidecar_route_matches_total";
pub const ROUTE_MISSES_TOTAL: &str = "sidecar_route_misses_total";
pub const ROUTE_TABLE_SWAPS_TOTAL: &str = "sidecar_route_table_swaps_total";
pub const CACHE_HITS_TOTAL: &str = "sidecar_cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "sidecar_cache_misses_total";
pub const FILTER_REJECTIONS_TOTAL: &str = "sidecar_filter_rejections_total";
