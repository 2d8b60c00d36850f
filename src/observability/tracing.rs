//! Distributed trace context resolution.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests (W3C, B3, custom, legacy)
//! - Generate a root trace when the caller sent none
//! - Render the resolved context into outbound propagation headers
//!
//! # Design Decisions
//! - Extraction order is a fixed list; the first strategy that succeeds wins
//! - Malformed inbound headers never fail a request, they fall through
//! - Every hop gets a fresh span id; the inbound one is only ever a parent

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::http::headers;
use crate::observability::trace_id::{
    generate_span_id, generate_span_id_excluding, generate_trace_id, is_valid_w3c_span_id,
    is_valid_w3c_trace_id, normalize_span_id, normalize_trace_id,
};

const W3C_VERSION: &str = "00";
const W3C_FLAGS_SAMPLED: &str = "01";
const W3C_FLAGS_NOT_SAMPLED: &str = "00";

/// Where a request's trace context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceSource {
    W3cTraceparent,
    B3Single,
    B3Headers,
    CustomXTraceId,
    LegacyTraceId,
    GatewayGenerated,
}

impl TraceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceSource::W3cTraceparent => "w3c-traceparent",
            TraceSource::B3Single => "b3-single",
            TraceSource::B3Headers => "b3-headers",
            TraceSource::CustomXTraceId => "custom-x-trace-id",
            TraceSource::LegacyTraceId => "legacy-trace-id",
            TraceSource::GatewayGenerated => "gateway-generated",
        }
    }
}

impl fmt::Display for TraceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace context resolved for one request.
///
/// `trace_id` is the id as the caller sent it (custom and legacy headers may
/// carry any text); `w3c_trace_id` is its normalized 32-hex form used for
/// `traceparent`. Both ids are guaranteed non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceInfo {
    trace_id: String,
    w3c_trace_id: String,
    span_id: String,
    source: TraceSource,
    sampled: bool,
}

impl TraceInfo {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        source: TraceSource,
        sampled: bool,
    ) -> Self {
        let trace_id = trace_id.into();
        let span_id = span_id.into();

        let mut w3c_trace_id = normalize_trace_id(&trace_id);
        if !is_valid_w3c_trace_id(&w3c_trace_id) {
            tracing::debug!(trace_id = %trace_id, "Trace id normalizes to an invalid value, regenerating");
            w3c_trace_id = generate_trace_id();
        }

        let mut span_id = if is_valid_w3c_span_id(&span_id) {
            span_id
        } else {
            normalize_span_id(&span_id)
        };
        if !is_valid_w3c_span_id(&span_id) {
            span_id = generate_span_id();
        }

        Self {
            trace_id,
            w3c_trace_id,
            span_id,
            source,
            sampled,
        }
    }

    /// Trace id as propagated on the backward-compatible headers.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Trace id in W3C form.
    pub fn w3c_trace_id(&self) -> &str {
        &self.w3c_trace_id
    }

    /// Span id of this hop.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn source(&self) -> TraceSource {
        self.source
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Render as a W3C `traceparent` value.
    pub fn to_w3c_traceparent(&self) -> String {
        let flags = if self.sampled {
            W3C_FLAGS_SAMPLED
        } else {
            W3C_FLAGS_NOT_SAMPLED
        };
        format!("{}-{}-{}-{}", W3C_VERSION, self.w3c_trace_id, self.span_id, flags)
    }
}

/// Extraction strategies in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    W3cTraceparent,
    B3Single,
    B3Headers,
    CustomHeader,
    LegacyHeader,
}

const EXTRACTION_ORDER: [Strategy; 5] = [
    Strategy::W3cTraceparent,
    Strategy::B3Single,
    Strategy::B3Headers,
    Strategy::CustomHeader,
    Strategy::LegacyHeader,
];

impl Strategy {
    fn extract(self, map: &HeaderMap) -> Option<TraceInfo> {
        match self {
            Strategy::W3cTraceparent => header_str(map, &headers::TRACEPARENT).and_then(from_traceparent),
            Strategy::B3Single => header_str(map, &headers::B3).and_then(from_b3_single),
            Strategy::B3Headers => {
                let trace_id = header_str(map, &headers::X_B3_TRACE_ID)?;
                let inbound_span = header_str(map, &headers::X_B3_SPAN_ID);
                Some(TraceInfo::new(
                    trace_id,
                    generate_span_id_excluding(inbound_span),
                    TraceSource::B3Headers,
                    true,
                ))
            }
            Strategy::CustomHeader => header_str(map, &headers::X_TRACE_ID)
                .map(|id| TraceInfo::new(id, generate_span_id(), TraceSource::CustomXTraceId, true)),
            Strategy::LegacyHeader => header_str(map, &headers::LEGACY_TRACE_ID)
                .map(|id| TraceInfo::new(id, generate_span_id(), TraceSource::LegacyTraceId, true)),
        }
    }
}

/// Resolves one `TraceInfo` per request from whatever tracing headers arrived.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextResolver;

impl TraceContextResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the trace context for a request. Never fails.
    pub fn resolve(&self, headers: &HeaderMap) -> TraceInfo {
        for strategy in EXTRACTION_ORDER {
            if let Some(info) = strategy.extract(headers) {
                tracing::debug!(
                    strategy = ?strategy,
                    trace_id = %info.trace_id(),
                    "Extracted trace context"
                );
                return info;
            }
        }

        let info = TraceInfo::new(
            generate_trace_id(),
            generate_span_id(),
            TraceSource::GatewayGenerated,
            true,
        );
        tracing::debug!(trace_id = %info.trace_id(), "Generated root trace context");
        info
    }

    /// Headers to set on the upstream request for a resolved trace.
    ///
    /// `inbound` is the original request's header map; its `tracestate` is
    /// carried over unchanged.
    pub fn outbound_headers(
        &self,
        trace: &TraceInfo,
        inbound: &HeaderMap,
    ) -> Vec<(HeaderName, HeaderValue)> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let mut out = Vec::with_capacity(7);
        let candidates = [
            (headers::TRACEPARENT, trace.to_w3c_traceparent()),
            (headers::X_TRACE_ID, trace.trace_id().to_string()),
            (headers::X_SPAN_ID, trace.span_id().to_string()),
            (headers::LEGACY_TRACE_ID, trace.trace_id().to_string()),
            (headers::X_TRACE_SOURCE, trace.source().as_str().to_string()),
            (headers::X_REQUEST_TIMESTAMP, timestamp.to_string()),
        ];
        for (name, value) in candidates {
            match HeaderValue::from_str(&value) {
                Ok(value) => out.push((name, value)),
                Err(_) => tracing::warn!(header = %name, "Skipping unrepresentable trace header"),
            }
        }

        if let Some(tracestate) = inbound.get(&headers::TRACESTATE) {
            out.push((headers::TRACESTATE, tracestate.clone()));
        }
        out
    }

    /// Resolve and write the outbound headers into the same map.
    pub fn apply(&self, headers: &mut HeaderMap) -> TraceInfo {
        let trace = self.resolve(headers);
        for (name, value) in self.outbound_headers(&trace, headers) {
            headers.insert(name, value);
        }
        trace
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn from_traceparent(value: &str) -> Option<TraceInfo> {
    let parts: Vec<&str> = value.split('-').collect();
    let [version, trace_id, parent_span_id, flags] = parts.as_slice() else {
        tracing::debug!(traceparent = %value, "Malformed traceparent, expected four fields");
        return None;
    };

    if *version != W3C_VERSION {
        tracing::debug!(version = %version, "Unsupported traceparent version");
        return None;
    }
    if trace_id.is_empty() || parent_span_id.is_empty() {
        return None;
    }

    let trace_id = if is_valid_w3c_trace_id(trace_id) {
        trace_id.to_string()
    } else {
        normalize_trace_id(trace_id)
    };
    let parent_span_id = if is_valid_w3c_span_id(parent_span_id) {
        parent_span_id.to_string()
    } else {
        normalize_span_id(parent_span_id)
    };

    if !is_valid_w3c_trace_id(&trace_id) || !is_valid_w3c_span_id(&parent_span_id) {
        tracing::debug!(traceparent = %value, "Traceparent ids invalid after normalization");
        return None;
    }

    Some(TraceInfo::new(
        trace_id,
        generate_span_id_excluding(Some(&parent_span_id)),
        TraceSource::W3cTraceparent,
        *flags == W3C_FLAGS_SAMPLED,
    ))
}

fn from_b3_single(value: &str) -> Option<TraceInfo> {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() < 2 || parts[0].trim().is_empty() {
        tracing::debug!(b3 = %value, "Malformed b3 header");
        return None;
    }
    let sampled = parts.get(2).is_some_and(|flag| *flag == "1");
    Some(TraceInfo::new(
        parts[0],
        generate_span_id_excluding(Some(parts[1])),
        TraceSource::B3Single,
        sampled,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const PARENT: &str = "00f067aa0ba902b7";

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_w3c_traceparent() {
        let info = TraceContextResolver::new()
            .resolve(&header_map(&[("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")]));

        assert_eq!(info.trace_id(), TRACE);
        assert_eq!(info.source(), TraceSource::W3cTraceparent);
        assert!(info.is_sampled());
        assert_ne!(info.span_id(), PARENT);
        assert!(is_valid_w3c_span_id(info.span_id()));

        let traceparent = info.to_w3c_traceparent();
        assert!(traceparent.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));
        assert!(traceparent.ends_with("-01"));
    }

    #[test]
    fn test_w3c_not_sampled() {
        let info = TraceContextResolver::new()
            .resolve(&header_map(&[("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00")]));
        assert!(!info.is_sampled());
        assert!(info.to_w3c_traceparent().ends_with("-00"));
    }

    #[test]
    fn test_w3c_uppercase_ids_are_normalized() {
        let info = TraceContextResolver::new()
            .resolve(&header_map(&[("traceparent", "00-4BF92F3577B34DA6A3CE929D0E0E4736-00F067AA0BA902B7-01")]));
        assert_eq!(info.source(), TraceSource::W3cTraceparent);
        assert_eq!(info.trace_id(), TRACE);
    }

    #[test]
    fn test_w3c_rejections_fall_through() {
        let resolver = TraceContextResolver::new();
        let cases = [
            "01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-01",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00--00f067aa0ba902b7-01",
        ];
        for traceparent in cases {
            let mut map = header_map(&[("x-trace-id", "fallback-trace")]);
            map.insert(headers::TRACEPARENT, HeaderValue::from_static(traceparent));
            let info = resolver.resolve(&map);
            assert_eq!(info.source(), TraceSource::CustomXTraceId, "case {}", traceparent);
        }
    }

    #[test]
    fn test_b3_single() {
        let info = TraceContextResolver::new()
            .resolve(&header_map(&[("b3", "4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-1")]));
        assert_eq!(info.trace_id(), TRACE);
        assert_eq!(info.source(), TraceSource::B3Single);
        assert!(info.is_sampled());
        assert_ne!(info.span_id(), PARENT);

        let unsampled = TraceContextResolver::new()
            .resolve(&header_map(&[("b3", "4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7")]));
        assert!(!unsampled.is_sampled());
    }

    #[test]
    fn test_invalid_b3_single_falls_through_to_multi_header() {
        let info = TraceContextResolver::new().resolve(&header_map(&[
            ("b3", "0"),
            ("x-b3-traceid", "4bf92f3577b34da6a3ce929d0e0e4736"),
        ]));
        assert_eq!(info.source(), TraceSource::B3Headers);
    }

    #[test]
    fn test_b3_headers() {
        let info = TraceContextResolver::new().resolve(&header_map(&[
            ("x-b3-traceid", "4bf92f3577b34da6a3ce929d0e0e4736"),
            ("x-b3-spanid", "00f067aa0ba902b7"),
        ]));
        assert_eq!(info.trace_id(), TRACE);
        assert_eq!(info.source(), TraceSource::B3Headers);
        assert!(info.is_sampled());
        assert_ne!(info.span_id(), PARENT);
    }

    #[test]
    fn test_custom_and_legacy_keep_raw_trace_id() {
        let resolver = TraceContextResolver::new();

        let custom = resolver.resolve(&header_map(&[("x-trace-id", "custom-trace-12345")]));
        assert_eq!(custom.trace_id(), "custom-trace-12345");
        assert_eq!(custom.source(), TraceSource::CustomXTraceId);
        assert!(is_valid_w3c_trace_id(custom.w3c_trace_id()));

        let legacy = resolver.resolve(&header_map(&[("traceid", "legacy-trace-id")]));
        assert_eq!(legacy.trace_id(), "legacy-trace-id");
        assert_eq!(legacy.source(), TraceSource::LegacyTraceId);
    }

    #[test]
    fn test_priority_order() {
        let info = TraceContextResolver::new().resolve(&header_map(&[
            ("traceparent", "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
            ("b3", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-bbbbbbbbbbbbbbbb-1"),
            ("x-b3-traceid", "cccccccccccccccccccccccccccccccc"),
            ("x-trace-id", "custom"),
            ("traceid", "legacy"),
        ]));
        assert_eq!(info.source(), TraceSource::W3cTraceparent);
        assert_eq!(info.trace_id(), TRACE);
    }

    #[test]
    fn test_generated_when_no_headers() {
        let info = TraceContextResolver::new().resolve(&HeaderMap::new());
        assert_eq!(info.source(), TraceSource::GatewayGenerated);
        assert!(info.is_sampled());
        assert!(is_valid_w3c_trace_id(info.trace_id()));
        assert!(is_valid_w3c_span_id(info.span_id()));
    }

    #[test]
    fn test_blank_headers_are_ignored() {
        let info = TraceContextResolver::new()
            .resolve(&header_map(&[("traceparent", "   "), ("x-trace-id", "")]));
        assert_eq!(info.source(), TraceSource::GatewayGenerated);
    }

    #[test]
    fn test_traceparent_round_trip() {
        let sampled = TraceInfo::new(TRACE, PARENT, TraceSource::W3cTraceparent, true);
        assert_eq!(sampled.to_w3c_traceparent(), format!("00-{}-{}-01", TRACE, PARENT));

        let unsampled = TraceInfo::new(TRACE, PARENT, TraceSource::W3cTraceparent, false);
        assert_eq!(unsampled.to_w3c_traceparent(), format!("00-{}-{}-00", TRACE, PARENT));
    }

    #[test]
    fn test_apply_writes_outbound_headers() {
        let mut map = header_map(&[
            ("x-b3-traceid", "4bf92f3577b34da6a3ce929d0e0e4736"),
            ("tracestate", "congo=t61rcWkgMzE"),
        ]);
        let info = TraceContextResolver::new().apply(&mut map);

        assert_eq!(map.get(&headers::TRACEPARENT).unwrap(), info.to_w3c_traceparent().as_str());
        assert_eq!(map.get(&headers::X_TRACE_ID).unwrap(), TRACE);
        assert_eq!(map.get(&headers::LEGACY_TRACE_ID).unwrap(), TRACE);
        assert_eq!(map.get(&headers::X_SPAN_ID).unwrap(), info.span_id());
        assert_eq!(map.get(&headers::X_TRACE_SOURCE).unwrap(), "b3-headers");
        assert_eq!(map.get(&headers::TRACESTATE).unwrap(), "congo=t61rcWkgMzE");
        let timestamp: u128 = map
            .get(&headers::X_REQUEST_TIMESTAMP)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(timestamp > 0);
    }
}
