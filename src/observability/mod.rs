//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters and histograms via the metrics facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Whatever metrics recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems
//! - Tokens never appear in logs; only their hash does
//! - The crate records through the `metrics` facade and installs no recorder

pub mod logging;
pub mod metrics;
