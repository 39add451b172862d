//! Request orchestration: route lookup, filter chain, forwarding.
//!
//! # Responsibilities
//! - Resolve the destination through the lookup strategy chain
//! - Run the ingress or egress filter chain, fail-fast
//! - Forward through the transport and hand the response back
//! - Map every failure onto the structured wire error
//!
//! The handler owns no transport; `Forwarder` is injected so the embedding
//! process (and the tests) decide how bytes actually move.

use std::sync::Arc;
use std::time::Instant;

use crate::context::{Direction, RequestContext};
use crate::error::{SidecarError, StructuredError, TenantErrorPolicy};
use crate::external::{ForwardedResponse, Forwarder};
use crate::observability::metrics as metric_names;
use crate::filter::{EgressFilter, FilterChain, IngressFilter};
use crate::routing::lookup::LookupChain;

/// Outcome handed to the embedding process: either the forwarded response or
/// a structured error plus the status it maps to.
#[derive(Debug)]
pub enum HandlerOutcome {
    Forwarded(ForwardedResponse),
    Rejected { status: u16, error: StructuredError },
}

impl HandlerOutcome {
    pub fn status(&self) -> u16 {
        match self {
            HandlerOutcome::Forwarded(response) => response.status,
            HandlerOutcome::Rejected { status, .. } => *status,
        }
    }
}

/// Drives one request through lookup, filtering, and forwarding.
pub struct RequestHandler {
    ingress_lookup: LookupChain,
    egress_lookup: LookupChain,
    ingress_filters: FilterChain<dyn IngressFilter>,
    egress_filters: FilterChain<dyn EgressFilter>,
    forwarder: Arc<dyn Forwarder>,
    error_policy: TenantErrorPolicy,
}

impl RequestHandler {
    pub fn new(
        ingress_lookup: LookupChain,
        egress_lookup: LookupChain,
        ingress_filters: FilterChain<dyn IngressFilter>,
        egress_filters: FilterChain<dyn EgressFilter>,
        forwarder: Arc<dyn Forwarder>,
        error_policy: TenantErrorPolicy,
    ) -> Self {
        Self {
            ingress_lookup,
            egress_lookup,
            ingress_filters,
            egress_filters,
            forwarder,
            error_policy,
        }
    }

    /// Run one request end to end. Never returns `Err`; failures become a
    /// `Rejected` outcome carrying the wire error.
    pub async fn handle(&self, mut ctx: RequestContext) -> HandlerOutcome {
        let start = Instant::now();
        let method = ctx.method.to_string();
        let path = ctx.path.clone();

        let result = self.pipeline(&mut ctx).await;
        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    direction = ?ctx.direction,
                    method = %method,
                    path = %path,
                    status = response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Request completed"
                );
                metrics::counter!(
                    metric_names::REQUESTS_TOTAL,
                    "direction" => direction_label(ctx.direction),
                    "status" => status_class(response.status),
                )
                .increment(1);
                metrics::histogram!(
                    metric_names::REQUEST_DURATION_SECONDS,
                    "direction" => direction_label(ctx.direction),
                )
                .record(elapsed.as_secs_f64());
                HandlerOutcome::Forwarded(response)
            }
            Err(err) => {
                let status = err.status_code(self.error_policy);
                tracing::warn!(
                    request_id = %ctx.request_id,
                    direction = ?ctx.direction,
                    method = %method,
                    path = %path,
                    status,
                    error = %err,
                    "Request rejected"
                );
                metrics::counter!(
                    metric_names::REQUESTS_TOTAL,
                    "direction" => direction_label(ctx.direction),
                    "status" => status_class(status),
                )
                .increment(1);
                HandlerOutcome::Rejected { status, error: err.to_wire() }
            }
        }
    }

    async fn pipeline(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<ForwardedResponse, SidecarError> {
        let lookup = match ctx.direction {
            Direction::Ingress => &self.ingress_lookup,
            Direction::Egress => &self.egress_lookup,
        };

        ctx.mark("lookup_start");
        let entry = lookup.resolve(ctx).await?.ok_or_else(|| {
            SidecarError::RouteNotFound {
                method: ctx.method.to_string(),
                path: ctx.path.clone(),
            }
        })?;
        ctx.routing = Some(Arc::clone(&entry));
        ctx.mark("lookup_done");

        match ctx.direction {
            Direction::Ingress => self.ingress_filters.run(ctx).await?,
            Direction::Egress => self.egress_filters.run(ctx).await?,
        }
        ctx.mark("filters_done");

        let response = self.forwarder.forward(ctx, &entry).await?;
        ctx.mark("forwarded");
        Ok(response)
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Ingress => "ingress",
        Direction::Egress => "egress",
    }
}

fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
