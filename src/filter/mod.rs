//! Filter chain engine.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → filters sorted by ascending order key (stable for ties)
//!     → should_skip(ctx)?  yes → no-op success, next filter
//!     → filter(ctx)        err → abort remaining filters, propagate
//! ```
//!
//! # Design Decisions
//! - Two disjoint, immutable-after-startup lists: ingress and egress
//! - Filter N+1 starts only after filter N resolved successfully
//! - Ordering is load-bearing; each filter declares an integer order key

pub mod authorize;
pub mod egress;
pub mod ingress;

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::SidecarError;
use crate::observability::metrics as metric_names;

/// Common filter shape shared by both directions.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Name for logs and failure diagnostics.
    fn name(&self) -> &'static str;

    /// Position in the chain; ascending order runs earlier.
    fn order(&self) -> i32;

    /// Skipped filters are no-op successes.
    fn should_skip(&self, _ctx: &RequestContext) -> bool {
        false
    }

    /// Apply the filter, mutating the context.
    async fn filter(&self, ctx: &mut RequestContext) -> Result<(), SidecarError>;
}

/// Filter applied to gateway → module traffic.
pub trait IngressFilter: Filter {}

/// Filter applied to module → other-destination traffic.
pub trait EgressFilter: Filter {}

/// Ordered, fail-fast filter list.
///
/// `F` is `dyn IngressFilter` or `dyn EgressFilter`; the two chains are
/// distinct types so they cannot be mixed up at wiring time.
pub struct FilterChain<F: ?Sized + Filter> {
    filters: Vec<Arc<F>>,
}

impl<F: ?Sized + Filter> FilterChain<F> {
    /// Build a chain; filters are sorted by ascending order key. The sort is
    /// stable, so ties keep their registration order.
    pub fn new(mut filters: Vec<Arc<F>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Run every filter in order. The first failure aborts the rest.
    pub async fn run(&self, ctx: &mut RequestContext) -> Result<(), SidecarError> {
        for filter in &self.filters {
            if filter.should_skip(ctx) {
                tracing::trace!(
                    request_id = %ctx.request_id,
                    filter = filter.name(),
                    "Filter skipped"
                );
                continue;
            }
            if let Err(err) = filter.filter(ctx).await {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    filter = filter.name(),
                    error = %err,
                    "Filter rejected request"
                );
                metrics::counter!(metric_names::FILTER_REJECTIONS_TOTAL, "filter" => filter.name())
                    .increment(1);
                return Err(err);
            }
        }
        Ok(())
    }
}
