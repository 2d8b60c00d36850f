//! First stage: resolve trace context and open the request scope.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::response::Response;
use futures_util::future::BoxFuture;
use tracing::Instrument;

use crate::http::headers;
use crate::observability::observer::PipelineObserver;
use crate::observability::scope::RequestScope;
use crate::observability::tracing::TraceContextResolver;
use crate::pipeline::{Chain, Exchange, GatewayFilter};

pub struct TracingFilter {
    resolver: TraceContextResolver,
    observer: Arc<dyn PipelineObserver>,
}

impl TracingFilter {
    pub fn new(resolver: TraceContextResolver, observer: Arc<dyn PipelineObserver>) -> Self {
        Self { resolver, observer }
    }
}

impl GatewayFilter for TracingFilter {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn filter<'a>(&'a self, mut exchange: Exchange, chain: Chain<'a>) -> BoxFuture<'a, Response> {
        let trace = self.resolver.apply(exchange.request_mut().headers_mut());
        let scope = RequestScope::enter(
            trace.clone(),
            exchange.request().method().clone(),
            exchange.path(),
            self.observer.clone(),
        );
        let echoed = HeaderValue::from_bytes(trace.trace_id().as_bytes()).ok();
        exchange.set_trace(trace);

        let span = scope.span().clone();
        Box::pin(
            async move {
                let mut response = chain.proceed(exchange).await;
                if let Some(trace_id) = echoed {
                    response.headers_mut().insert(headers::X_TRACE_ID, trace_id);
                }
                scope.finish(response.status());
                response
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::forward::{ForwardError, Forwarder};
    use crate::observability::observer::TelemetryObserver;
    use crate::pipeline::{FilterPipeline, PipelineState, StateTrail};
    use axum::body::Body;
    use axum::http::Request;

    struct Echo;

    impl Forwarder for Echo {
        fn forward(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response, ForwardError>> {
            Box::pin(async move {
                let mut response = Response::new(Body::empty());
                *response.headers_mut() = request.headers().clone();
                Ok(response)
            })
        }
    }

    fn pipeline() -> FilterPipeline {
        FilterPipeline::new(
            vec![Arc::new(TracingFilter::new(
                TraceContextResolver::new(),
                Arc::new(TelemetryObserver),
            ))],
            Arc::new(Echo),
        )
    }

    #[tokio::test]
    async fn test_trace_headers_reach_upstream() {
        let request = Request::builder()
            .uri("/api/orders")
            .header("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
            .header("tracestate", "vendor=opaque")
            .body(Body::empty())
            .unwrap();
        let response = pipeline().handle(request).await;
        let upstream = response.headers();

        let traceparent = upstream["traceparent"].to_str().unwrap();
        assert!(traceparent.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
        assert!(traceparent.ends_with("-01"));
        assert!(!traceparent.contains("00f067aa0ba902b7"));
        assert_eq!(upstream["tracestate"], "vendor=opaque");
        assert_eq!(upstream["x-trace-source"], "w3c-traceparent");
        assert_eq!(upstream["x-trace-id"], "4bf92f3577b34da6a3ce929d0e0e4736");

        let trail = response.extensions().get::<StateTrail>().unwrap();
        assert_eq!(
            trail.0,
            vec![
                PipelineState::Received,
                PipelineState::Traced,
                PipelineState::Forwarded
            ]
        );
    }

    #[tokio::test]
    async fn test_raw_custom_id_echoed_on_response() {
        let request = Request::builder()
            .uri("/")
            .header("x-trace-id", "order-service-77")
            .body(Body::empty())
            .unwrap();
        let response = pipeline().handle(request).await;

        assert_eq!(response.headers()["x-trace-id"], "order-service-77");
        assert_eq!(response.headers()["traceid"], "order-service-77");
    }
}
