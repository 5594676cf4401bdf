use axum::body::Body;
use axum::response::Response;

#[inline]
pub(crate) fn ok_json_response(body_bytes: bytes::Bytes) -> Response {
    let mut response = Response::new(Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

/// A 200 `text/event-stream` response; the status is committed before the
/// first event, so later failures travel as in-band `error` events.
#[inline]
pub(crate) fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
