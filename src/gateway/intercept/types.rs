//! Usage: Boundary types handed over by the interception host.

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use reqwest::Url;

#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Target host, lowercased and without port. The URL wins over the `Host` header.
    pub fn host(&self) -> Option<String> {
        if let Some(host) = self.url.host_str().filter(|h| !h.is_empty()) {
            return Some(host.to_ascii_lowercase());
        }
        let raw = self.headers.get(axum::http::header::HOST)?.to_str().ok()?.trim();
        let host = match raw.strip_prefix('[') {
            Some(rest) => rest.split(']').next().unwrap_or(""),
            None => raw.split(':').next().unwrap_or(""),
        };
        (!host.is_empty()).then(|| host.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InterceptedResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// A response produced locally instead of contacting the upstream.
#[derive(Debug, Clone)]
pub struct SyntheticResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SyntheticResponse {
    pub(crate) fn no_content() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        );
        Self {
            status: StatusCode::NO_CONTENT,
            headers,
            body: Bytes::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// Send the (possibly rewritten) request upstream.
    Forward(InterceptedRequest),
    Respond(SyntheticResponse),
}
