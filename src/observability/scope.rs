//! Request-scoped diagnostic context.
//!
//! # Responsibilities
//! - Open the `gateway_request` span carrying the resolved trace ids
//! - Log request start and completion
//! - Tear down on every exit path, including cancellation
//!
//! # Design Decisions
//! - The context is a value owned by the request future, never a global;
//!   dropping the future drops the scope and closes the span
//! - Completion is explicit (`finish`); a scope dropped without it is a
//!   cancelled request

use std::sync::Arc;
use std::time::Instant;

use axum::http::{Method, StatusCode};
use tracing::Span;

use crate::observability::observer::PipelineObserver;
use crate::observability::tracing::TraceInfo;

/// Guard for one in-flight request.
pub struct RequestScope {
    trace: TraceInfo,
    span: Span,
    method: Method,
    path: String,
    started: Instant,
    observer: Arc<dyn PipelineObserver>,
    finished: bool,
}

impl RequestScope {
    pub fn enter(
        trace: TraceInfo,
        method: Method,
        path: impl Into<String>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        let path = path.into();
        let span = tracing::info_span!(
            "gateway_request",
            trace_id = %trace.trace_id(),
            span_id = %trace.span_id(),
            trace_source = %trace.source(),
            method = %method,
            path = %path,
        );
        span.in_scope(|| tracing::info!("Request started"));
        observer.on_trace_resolved(&trace);

        Self {
            trace,
            span,
            method,
            path,
            started: Instant::now(),
            observer,
            finished: false,
        }
    }

    pub fn trace(&self) -> &TraceInfo {
        &self.trace
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Mark the request complete with the status sent to the client.
    pub fn finish(mut self, status: StatusCode) {
        let elapsed = self.started.elapsed();
        self.span.in_scope(|| {
            let duration_ms = elapsed.as_millis() as u64;
            if status.is_server_error() {
                tracing::error!(status = status.as_u16(), duration_ms, "Request failed");
            } else {
                tracing::info!(status = status.as_u16(), duration_ms, "Request completed");
            }
        });
        self.observer
            .on_request_finished(&self.trace, &self.method, Some(status), elapsed);
        self.finished = true;
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let elapsed = self.started.elapsed();
        self.span.in_scope(|| {
            tracing::warn!(duration_ms = elapsed.as_millis() as u64, "Request cancelled");
        });
        self.observer
            .on_request_finished(&self.trace, &self.method, None, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::tracing::TraceSource;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        resolved: Mutex<Vec<String>>,
        finished: Mutex<Vec<Option<StatusCode>>>,
    }

    impl PipelineObserver for Recorder {
        fn on_trace_resolved(&self, trace: &TraceInfo) {
            self.resolved.lock().unwrap().push(trace.trace_id().to_string());
        }

        fn on_request_finished(
            &self,
            _trace: &TraceInfo,
            _method: &Method,
            status: Option<StatusCode>,
            _elapsed: Duration,
        ) {
            self.finished.lock().unwrap().push(status);
        }
    }

    fn trace() -> TraceInfo {
        TraceInfo::new(
            "4bf92f3577b34da6a3ce929d0e0e4736",
            "00f067aa0ba902b7",
            TraceSource::W3cTraceparent,
            true,
        )
    }

    #[test]
    fn test_finish_reports_status_once() {
        let recorder = Arc::new(Recorder::default());
        let scope = RequestScope::enter(trace(), Method::GET, "/api/orders", recorder.clone());
        assert_eq!(scope.path(), "/api/orders");
        scope.finish(StatusCode::OK);

        assert_eq!(recorder.resolved.lock().unwrap().len(), 1);
        assert_eq!(*recorder.finished.lock().unwrap(), vec![Some(StatusCode::OK)]);
    }

    #[test]
    fn test_drop_without_finish_reports_cancellation() {
        let recorder = Arc::new(Recorder::default());
        {
            let _scope = RequestScope::enter(trace(), Method::POST, "/api/orders", recorder.clone());
        }
        assert_eq!(*recorder.finished.lock().unwrap(), vec![None]);
    }
}
