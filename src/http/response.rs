//! JSON error responses produced by the gateway itself.
//!
//! Every terminal rejection uses `{code, message, success: false}` with the
//! HTTP status mirrored in `code`. Admission-control rejections carry the
//! request path instead of `success`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

const TOO_MANY_REQUESTS_MESSAGE: &str = "Too many requests, please retry later";

#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub code: u16,
    pub message: &'a str,
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedBody<'a> {
    pub code: u16,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<&'a str>,
    pub request_uri: &'a str,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorBody {
        code: status.as_u16(),
        message,
        success: false,
    };
    (status, Json(body)).into_response()
}

pub fn unauthorized(message: &str) -> Response {
    error_response(StatusCode::UNAUTHORIZED, message)
}

pub fn forbidden(message: &str) -> Response {
    error_response(StatusCode::FORBIDDEN, message)
}

pub fn bad_gateway(message: &str) -> Response {
    error_response(StatusCode::BAD_GATEWAY, message)
}

/// Block handler invoked by admission control.
pub fn too_many_requests(request_uri: &str, route_id: Option<&str>) -> Response {
    let body = BlockedBody {
        code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
        message: TOO_MANY_REQUESTS_MESSAGE,
        route_id,
        request_uri,
    };
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}
