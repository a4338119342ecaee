//! Response headers middleware.
//!
//! Adds headers to all responses:
//! - X-Content-Type-Options
//! - X-Frame-Options
//! - Cache-Control (unless the handler set one)
//!
//! No Content-Security-Policy is sent: the live reload client is an inline
//! script.

use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, HeaderName};
use tower_http::set_header::SetResponseHeaderLayer;

/// Cache policy for served files. Pages must be refetched after a reload.
const CACHE_POLICY: &str = "no-cache";

/// Create layer that adds X-Content-Type-Options header.
pub(crate) fn content_type_options_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    )
}

/// Create layer that adds X-Frame-Options header.
pub(crate) fn frame_options_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    )
}

/// Create layer that adds Cache-Control when the response has none.
pub(crate) fn cache_control_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(CACHE_CONTROL, HeaderValue::from_static(CACHE_POLICY))
}

