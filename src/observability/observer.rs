//! Pipeline event observer.
//!
//! The pipeline reports what it decided, not how to record it. The default
//! `TelemetryObserver` turns events into metrics; tests swap in their own.

use std::fmt;
use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::observability::metrics;
use crate::observability::tracing::TraceInfo;

/// Outcome of the authentication and permission stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityOutcome {
    WhitelistBypassed,
    Authenticated,
    Unauthenticated,
    PermissionSkipped,
    PermissionGranted,
    PermissionDenied,
}

impl SecurityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityOutcome::WhitelistBypassed => "whitelist_bypassed",
            SecurityOutcome::Authenticated => "authenticated",
            SecurityOutcome::Unauthenticated => "unauthenticated",
            SecurityOutcome::PermissionSkipped => "permission_skipped",
            SecurityOutcome::PermissionGranted => "permission_granted",
            SecurityOutcome::PermissionDenied => "permission_denied",
        }
    }
}

impl fmt::Display for SecurityOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives pipeline events. All methods default to no-ops.
pub trait PipelineObserver: Send + Sync {
    fn on_trace_resolved(&self, _trace: &TraceInfo) {}

    fn on_security_outcome(&self, _trace: &TraceInfo, _outcome: SecurityOutcome) {}

    /// `status` is `None` when the request was cancelled before a response.
    fn on_request_finished(
        &self,
        _trace: &TraceInfo,
        _method: &Method,
        _status: Option<StatusCode>,
        _elapsed: Duration,
    ) {
    }
}

/// Records pipeline events as Prometheus metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryObserver;

impl PipelineObserver for TelemetryObserver {
    fn on_trace_resolved(&self, trace: &TraceInfo) {
        metrics::record_trace_source(trace.source());
    }

    fn on_security_outcome(&self, _trace: &TraceInfo, outcome: SecurityOutcome) {
        metrics::record_auth_outcome(outcome.as_str());
    }

    fn on_request_finished(
        &self,
        _trace: &TraceInfo,
        method: &Method,
        status: Option<StatusCode>,
        elapsed: Duration,
    ) {
        if let Some(status) = status {
            metrics::record_request(method.as_str(), status.as_u16(), elapsed);
        }
    }
}
