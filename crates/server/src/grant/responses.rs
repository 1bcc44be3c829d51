//! Response builders shared by the grant endpoints.
//!
//! Every response carries `cache-control: no-store`; codes and tokens must never
//! end up in an intermediary cache.

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub const EXPIRED_PAGE: &str = "<H1>Sorry, code has expired</H1>";
pub const ERROR_PAGE: &str = "<H1>Error, can't update status</H1>";
pub const DENIED_PAGE: &str = "<H1>Thanks, Device has been unauthorized.</H1>";
pub const AUTHORIZED_PAGE: &str =
    "<H1>Thanks, Device has been Authorized. You can return to your device.</H1>";

const JSON: &str = "application/json";
const HTML: &str = "text/html";

fn with_headers(status: StatusCode, content_type: &'static str, body: Body) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// JSON headers, no body. Used for bare status failures (401, 405, 500).
pub fn empty(status: StatusCode) -> Response {
    with_headers(status, JSON, Body::empty())
}

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(bytes) => with_headers(status, JSON, Body::from(bytes)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// `400 {"error": "<token>"}`.
pub fn json_error(error: &str) -> Response {
    json(StatusCode::BAD_REQUEST, &ErrorBody { error })
}

pub fn html(status: StatusCode, body: impl Into<String>) -> Response {
    with_headers(status, HTML, Body::from(body.into()))
}

pub fn expired_page() -> Response {
    html(StatusCode::BAD_REQUEST, EXPIRED_PAGE)
}

pub fn error_page() -> Response {
    html(StatusCode::BAD_REQUEST, ERROR_PAGE)
}

/// `302 Found` to an absolute URL.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = empty(StatusCode::FOUND);
            response.headers_mut().insert(header::LOCATION, value);
            response.headers_mut().remove(header::CONTENT_TYPE);
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Redirect target is not a valid header value");
            error_page()
        }
    }
}

/// Fallback for any path or method the service does not serve.
pub async fn method_not_allowed() -> Response {
    empty(StatusCode::METHOD_NOT_ALLOWED)
}
