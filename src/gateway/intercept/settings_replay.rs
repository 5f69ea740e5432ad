//! Usage: Replace the bulk settings-sync response body with the cached payload.

use super::types::{InterceptedRequest, InterceptedResponse};
use axum::http::{header, HeaderValue, Method, StatusCode};
use bytes::Bytes;

const OPERATION_QUERY_KEY: &str = "op";

pub(crate) fn is_settings_sync(
    req: &InterceptedRequest,
    status: StatusCode,
    sync_path: &str,
    operation: &str,
) -> bool {
    req.method == Method::POST
        && status == StatusCode::OK
        && req.url.path() == sync_path
        && req
            .url
            .query_pairs()
            .any(|(key, value)| key == OPERATION_QUERY_KEY && value == operation)
}

pub(crate) fn replay_settings(resp: &mut InterceptedResponse, cached: String) {
    let body = Bytes::from(cached);
    resp.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp.headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    resp.headers.remove(header::CONTENT_ENCODING);
    resp.headers.remove(header::TRANSFER_ENCODING);
    resp.headers.remove(header::ETAG);
    resp.body = body;
}
