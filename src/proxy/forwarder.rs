//! Origin forwarding
//!
//! One shared `reqwest` client with redirects disabled carries every origin
//! call. Header sets for outbound requests and relayed responses are always
//! built fresh from the source map.

use crate::config::UpstreamConfig;
use crate::PortcullisError;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, Method, Uri};
use axum::response::Response;
use thiserror::Error;

/// Errors talking to an origin
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Origin request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Hop-by-hop headers that must not be forwarded
static HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// An inbound request with its body still unread
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Body,
    /// Normalized hostname the request was addressed to
    pub hostname: String,
}

impl InboundRequest {
    /// Request path without the query
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Request path including the query string
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// Whether the client announced a request body
    pub fn has_body(&self) -> bool {
        self.headers.contains_key(header::TRANSFER_ENCODING)
            || self
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .is_some_and(|len| len > 0)
    }

    /// Read the whole body into memory, failing once it exceeds `limit` bytes
    pub async fn buffer_body(&mut self, limit: usize) -> Result<Bytes, PortcullisError> {
        let body = std::mem::take(&mut self.body);
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| PortcullisError::BodyTooLarge(limit))?;
        self.body = Body::from(bytes.clone());
        Ok(bytes)
    }
}

/// Copy of `headers` without hop-by-hop entries; repeated headers are kept
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Build a client-facing response from an origin's status and headers
///
/// Every header line is appended, so multiple `Set-Cookie` lines from the
/// origin all reach the client.
pub fn response_from_parts(status: reqwest::StatusCode, headers: &HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = forwardable_headers(headers);
    response
}

/// Relay an origin response to the client, streaming the body
pub fn relay(origin: reqwest::Response) -> Response {
    let status = origin.status();
    let headers = origin.headers().clone();
    response_from_parts(status, &headers, Body::from_stream(origin.bytes_stream()))
}

/// Sends requests to legacy origins
pub struct Forwarder {
    client: reqwest::Client,
    upstream: UpstreamConfig,
}

impl Forwarder {
    /// Create a forwarder for the given upstream settings
    pub fn new(upstream: UpstreamConfig) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = upstream.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;

        Ok(Self { client, upstream })
    }

    /// Absolute origin URL for a path on `hostname`
    pub fn origin_url(&self, hostname: &str, path_and_query: &str) -> String {
        format!("{}{}", self.upstream.origin_base(hostname), path_and_query)
    }

    /// Send one request to an origin
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<reqwest::Body>,
    ) -> Result<reqwest::Response, ForwardError> {
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    /// Forward a request to its origin unchanged and relay the answer
    pub async fn passthrough(&self, inbound: InboundRequest) -> Result<Response, ForwardError> {
        let url = self.origin_url(&inbound.hostname, inbound.path_and_query());
        self.forward(&url, inbound).await
    }

    /// Forward a request unchanged to `base` (a scheme://host[:port] URL)
    pub async fn forward_to(
        &self,
        base: &str,
        inbound: InboundRequest,
    ) -> Result<Response, ForwardError> {
        let url = format!("{}{}", base, inbound.path_and_query());
        self.forward(&url, inbound).await
    }

    async fn forward(&self, url: &str, inbound: InboundRequest) -> Result<Response, ForwardError> {
        tracing::debug!(method = %inbound.method, url = %url, "Forwarding request");

        let headers = forwardable_headers(&inbound.headers);
        let body = inbound
            .has_body()
            .then(|| reqwest::Body::wrap_stream(inbound.body.into_data_stream()));
        let origin = self.send(inbound.method, url, headers, body).await?;
        Ok(relay(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::collections::HashMap;

    #[test]
    fn test_strips_hop_by_hop_and_keeps_repeats() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::HOST, HeaderValue::from_static("wiki.example.com"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let out = forwardable_headers(&headers);
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(out.get(header::HOST).unwrap(), "wiki.example.com");
        assert_eq!(out.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_origin_url() {
        let mut overrides = HashMap::new();
        overrides.insert("wiki.example.com".to_string(), "http://10.0.0.5:8080".to_string());
        let forwarder = Forwarder::new(UpstreamConfig {
            scheme: "https".to_string(),
            timeout: None,
            overrides,
        })
        .unwrap();

        assert_eq!(
            forwarder.origin_url("wiki.example.com", "/login?next=%2F"),
            "http://10.0.0.5:8080/login?next=%2F"
        );
        assert_eq!(
            forwarder.origin_url("crm.example.com", "/"),
            "https://crm.example.com/"
        );
    }

    fn inbound(headers: HeaderMap, body: &'static str) -> InboundRequest {
        InboundRequest {
            method: Method::POST,
            uri: "/login?next=%2Fhome".parse().unwrap(),
            headers,
            body: Body::from(body),
            hostname: "wiki.example.com".to_string(),
        }
    }

    #[test]
    fn test_path_and_query() {
        let inbound = inbound(HeaderMap::new(), "");
        assert_eq!(inbound.path(), "/login");
        assert_eq!(inbound.path_and_query(), "/login?next=%2Fhome");
    }

    #[test]
    fn test_has_body() {
        assert!(!inbound(HeaderMap::new(), "").has_body());

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(!inbound(headers, "").has_body());

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        assert!(inbound(headers, "hello").has_body());

        let mut headers = HeaderMap::new();
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert!(inbound(headers, "hello").has_body());
    }

    #[tokio::test]
    async fn test_buffer_body_keeps_body_readable() {
        let mut request = inbound(HeaderMap::new(), "user=a&pass=b");
        let bytes = request.buffer_body(64).await.unwrap();
        assert_eq!(&bytes[..], b"user=a&pass=b");

        let again = axum::body::to_bytes(request.body, 64).await.unwrap();
        assert_eq!(again, bytes);
    }

    #[tokio::test]
    async fn test_buffer_body_over_limit() {
        let mut request = inbound(HeaderMap::new(), "user=a&pass=bbbbbbbbbbbbbbbb");
        assert!(matches!(
            request.buffer_body(8).await,
            Err(PortcullisError::BodyTooLarge(8))
        ));
    }
}
