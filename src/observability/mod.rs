//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → tracing.rs (TraceContextResolver → TraceInfo)
//!     → scope.rs (per-request span, start/finish logs)
//!     → observer.rs (pipeline events)
//!         → metrics.rs (Prometheus counters, histograms)
//!
//! logging.rs installs the subscriber that renders every span and event.
//! ```
//!
//! # Design Decisions
//! - Trace ids flow through the request as a value, never thread-local state
//! - Metrics are cheap (atomic increments behind the `metrics` facade)
//! - A malformed tracing header never fails a request

pub mod logging;
pub mod metrics;
pub mod observer;
pub mod scope;
pub mod trace_id;
pub mod tracing;

pub use observer::{PipelineObserver, SecurityOutcome, TelemetryObserver};
pub use scope::RequestScope;
pub use self::tracing::{TraceContextResolver, TraceInfo, TraceSource};
