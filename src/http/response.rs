//! Response construction for forwarded and locally answered requests.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Answer static fallback routes
//! - Map an unreachable upstream to 502 and mark it for the admission layer

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::admission::UpstreamFailure;

/// Header naming the route key whose fallback produced the response.
pub const X_VANGUARD_FALLBACK: &str = "x-vanguard-fallback";

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

/// Fixed response configured as a route handler.
pub fn static_response(route_key: &str, status: u16, body: String, fallback: bool) -> Response {
    // from_u16 accepts anything in 100..1000; HTTP only defines up to 599.
    let status = Some(status)
        .filter(|code| (100..=599).contains(code))
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let mut response = (status, body).into_response();
    if fallback {
        if let Ok(value) = HeaderValue::from_str(route_key) {
            response.headers_mut().insert(X_VANGUARD_FALLBACK, value);
        }
    }
    response
}

/// 502 for an upstream that could not be reached. Carries `UpstreamFailure`
/// so the admission layer counts it as an exception.
pub fn upstream_unreachable() -> Response {
    let mut response = (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
    response.extensions_mut().insert(UpstreamFailure);
    response
}

/// Re-wrap an upstream response for the client.
pub fn from_upstream(response: hyper::Response<hyper::body::Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
