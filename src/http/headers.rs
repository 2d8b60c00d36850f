//! Header names read and written by the gateway.

use axum::http::HeaderName;

/// W3C trace context: `{version}-{trace-id}-{parent-id}-{trace-flags}`.
pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");
/// W3C vendor-specific trace state, propagated unchanged.
pub const TRACESTATE: HeaderName = HeaderName::from_static("tracestate");
/// B3 single header: `{trace-id}-{span-id}-{sampled}-{parent-span-id}`.
pub const B3: HeaderName = HeaderName::from_static("b3");
pub const X_B3_TRACE_ID: HeaderName = HeaderName::from_static("x-b3-traceid");
pub const X_B3_SPAN_ID: HeaderName = HeaderName::from_static("x-b3-spanid");
pub const X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");
pub const X_SPAN_ID: HeaderName = HeaderName::from_static("x-span-id");
/// Legacy trace id header, lowest extraction priority.
pub const LEGACY_TRACE_ID: HeaderName = HeaderName::from_static("traceid");
pub const X_TRACE_SOURCE: HeaderName = HeaderName::from_static("x-trace-source");
pub const X_REQUEST_TIMESTAMP: HeaderName = HeaderName::from_static("x-request-timestamp");

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USERNAME: HeaderName = HeaderName::from_static("x-username");
pub const X_USER_ROLES: HeaderName = HeaderName::from_static("x-user-roles");
pub const X_USER_MENUS: HeaderName = HeaderName::from_static("x-user-menus");

/// Identity headers attached once a caller is known.
pub const IDENTITY_HEADERS: [HeaderName; 4] = [X_USER_ID, X_USERNAME, X_USER_ROLES, X_USER_MENUS];
