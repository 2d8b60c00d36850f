//! Property tests for identifier normalization and trace resolution.

use axum::http::{HeaderMap, HeaderValue};
use proptest::prelude::*;

use edge_gateway::observability::trace_id::{
    is_valid_w3c_span_id, is_valid_w3c_trace_id, normalize, SPAN_ID_WIDTH, TRACE_ID_WIDTH,
};
use edge_gateway::observability::{TraceContextResolver, TraceSource};

fn arb_width() -> impl Strategy<Value = usize> {
    prop_oneof![Just(TRACE_ID_WIDTH), Just(SPAN_ID_WIDTH)]
}

proptest! {
    /// Property: output is always exactly `width` lowercase hex characters
    #[test]
    fn proptest_normalize_fixed_width_hex(raw in ".{0,80}", width in arb_width()) {
        let normalized = normalize(&raw, width);
        prop_assert_eq!(normalized.len(), width);
        prop_assert!(normalized.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    }

    /// Property: normalizing twice changes nothing
    #[test]
    fn proptest_normalize_idempotent(raw in ".{0,80}", width in arb_width()) {
        let once = normalize(&raw, width);
        prop_assert_eq!(normalize(&once, width), once);
    }

    /// Property: a non-zero hex digit in the input never yields the all-zero id
    #[test]
    fn proptest_normalize_never_all_zero(
        prefix in "[0-]{0,40}",
        digit in "[1-9a-fA-F]",
        suffix in "[0-9a-zA-Z-]{0,40}",
        width in arb_width(),
    ) {
        let raw = format!("{}{}{}", prefix, digit, suffix);
        let normalized = normalize(&raw, width);
        prop_assert!(normalized.bytes().any(|b| b != b'0'));
    }

    /// Property: a W3C hop always gets a new, valid span id
    #[test]
    fn proptest_traceparent_span_regenerated(
        trace_id in "[0-9a-f]{32}",
        span_id in "[0-9a-f]{16}",
        sampled in any::<bool>(),
    ) {
        prop_assume!(is_valid_w3c_trace_id(&trace_id) && is_valid_w3c_span_id(&span_id));
        let flags = if sampled { "01" } else { "00" };
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_str(&format!("00-{}-{}-{}", trace_id, span_id, flags)).unwrap(),
        );

        let trace = TraceContextResolver::new().resolve(&headers);
        prop_assert_eq!(trace.source(), TraceSource::W3cTraceparent);
        prop_assert_eq!(trace.w3c_trace_id(), trace_id.as_str());
        prop_assert_ne!(trace.span_id(), span_id.as_str());
        prop_assert!(is_valid_w3c_span_id(trace.span_id()));
        prop_assert_eq!(trace.is_sampled(), sampled);
    }

    /// Property: whatever arrives in the custom header, rendered ids are valid
    #[test]
    fn proptest_custom_header_renders_valid_traceparent(raw in "[ -~]{1,64}") {
        prop_assume!(!raw.trim().is_empty());
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_str(&raw).unwrap());

        let trace = TraceContextResolver::new().resolve(&headers);
        prop_assert!(is_valid_w3c_trace_id(trace.w3c_trace_id()));
        prop_assert!(is_valid_w3c_span_id(trace.span_id()));
    }
}
