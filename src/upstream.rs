//! Upstream forwarding client

use std::future::Future;
use std::time::Duration;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::config::BaseUrl;
use crate::proxy::RequestDescriptor;
use crate::{Result, SnapError};

/// Headers owned by the transport; copying them onto the outbound request
/// is illegal or misleading, so they are skipped rather than forwarded.
const RESTRICTED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

/// Fully buffered upstream response, ready to persist
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Complete response body
    pub body: Vec<u8>,
}

/// Upstream response relayed as it arrives; never persisted
pub struct StreamedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body stream
    pub body: BoxBody<Bytes, SnapError>,
}

/// Forwarding transport to the upstream service.
///
/// Two modes: capturing buffers the whole response so it can be persisted;
/// streaming relays bytes as they arrive and is used only when caching is
/// disabled for the method.
pub trait Upstream: Send + Sync {
    /// Forward a request and buffer the full response
    fn forward_captured(
        &self,
        descriptor: &RequestDescriptor,
    ) -> impl Future<Output = Result<CapturedResponse>> + Send;

    /// Forward a request and relay the response body as a stream
    fn forward_streaming(
        &self,
        descriptor: &RequestDescriptor,
    ) -> impl Future<Output = Result<StreamedResponse>> + Send;
}

/// Hyper-backed upstream client with a pooled connector
pub struct HttpUpstream {
    base: BaseUrl,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpUpstream {
    /// Create a client targeting the given upstream base URL
    #[must_use]
    pub fn new(base: BaseUrl) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { base, client }
    }

    /// Build the outbound request for a descriptor
    fn build_request(&self, descriptor: &RequestDescriptor) -> Result<Request<Full<Bytes>>> {
        let uri = build_uri(&self.base, &descriptor.path, descriptor.query.as_deref())?;

        let method = descriptor.method.parse::<Method>().map_err(|e| {
            SnapError::InvalidRequest(format!("Invalid HTTP method '{}': {e}", descriptor.method))
        })?;

        // GET and HEAD carry no body; everything else forwards the inbound
        // body verbatim
        let body = if method == Method::GET || method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::copy_from_slice(&descriptor.body)
        };

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body))
            .map_err(|e| SnapError::InvalidRequest(format!("Failed to build request: {e}")))?;

        // Best-effort header copy: a header that cannot legally be set is
        // skipped, never fatal
        let outbound = request.headers_mut();
        for (name, value) in &descriptor.headers {
            if RESTRICTED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                debug!("skipping unmappable header name: {name}");
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                debug!("skipping unmappable header value for: {name}");
                continue;
            };
            outbound.append(name, value);
        }

        Ok(request)
    }
}

impl Upstream for HttpUpstream {
    async fn forward_captured(&self, descriptor: &RequestDescriptor) -> Result<CapturedResponse> {
        let request = self.build_request(descriptor)?;
        debug!("Forwarding {} {} (capturing)", descriptor.method, request.uri());

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Upstream request failed: {e}");
            SnapError::Upstream(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| SnapError::Upstream(format!("Failed to read response body: {e}")))?
            .to_bytes()
            .to_vec();

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }

    async fn forward_streaming(&self, descriptor: &RequestDescriptor) -> Result<StreamedResponse> {
        let request = self.build_request(descriptor)?;
        debug!("Forwarding {} {} (pass-through)", descriptor.method, request.uri());

        let response = self.client.request(request).await.map_err(|e| {
            warn!("Upstream request failed: {e}");
            SnapError::Upstream(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response
            .into_body()
            .map_err(|e| SnapError::Upstream(e.to_string()))
            .boxed();

        Ok(StreamedResponse {
            status,
            headers,
            body,
        })
    }
}

fn collect_headers(headers: &hyper::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

/// Build the outbound URI: base origin + path, with the raw query string
/// appended verbatim so the upstream sees exactly what the client sent
fn build_uri(base: &BaseUrl, path: &str, query: Option<&str>) -> Result<Uri> {
    let mut uri = format!("{}{path}", base.origin());
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }

    uri.parse::<Uri>()
        .map_err(|e| SnapError::InvalidRequest(format!("Invalid URI '{uri}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BaseUrl {
        BaseUrl {
            scheme: "http".to_string(),
            host: "api.example.com".to_string(),
            port: 80,
        }
    }

    fn descriptor(method: &str, headers: Vec<(String, String)>) -> RequestDescriptor {
        RequestDescriptor {
            method: method.to_string(),
            path: "/v1/items".to_string(),
            query: None,
            headers,
            body: b"payload".to_vec(),
        }
    }

    #[test]
    fn test_build_uri_simple() {
        let uri = build_uri(&base(), "/v1/items", None).unwrap();
        assert_eq!(uri.to_string(), "http://api.example.com:80/v1/items");
    }

    #[test]
    fn test_build_uri_with_query() {
        let uri = build_uri(&base(), "/v1/items", Some("page=1&sort=asc")).unwrap();
        assert_eq!(
            uri.to_string(),
            "http://api.example.com:80/v1/items?page=1&sort=asc"
        );
    }

    #[test]
    fn test_get_drops_body() {
        let upstream = HttpUpstream::new(base());
        let request = upstream.build_request(&descriptor("GET", vec![])).unwrap();

        assert_eq!(request.method(), Method::GET);
        // Full body size hint is exact
        assert_eq!(hyper::body::Body::size_hint(request.body()).exact(), Some(0));
    }

    #[test]
    fn test_post_keeps_body() {
        let upstream = HttpUpstream::new(base());
        let request = upstream.build_request(&descriptor("POST", vec![])).unwrap();

        assert_eq!(
            hyper::body::Body::size_hint(request.body()).exact(),
            Some(b"payload".len() as u64)
        );
    }

    #[test]
    fn test_restricted_headers_skipped() {
        let upstream = HttpUpstream::new(base());
        let request = upstream
            .build_request(&descriptor(
                "GET",
                vec![
                    ("Host".to_string(), "localhost:8090".to_string()),
                    ("Connection".to_string(), "keep-alive".to_string()),
                    ("Accept".to_string(), "application/json".to_string()),
                ],
            ))
            .unwrap();

        assert!(request.headers().get("host").is_none());
        assert!(request.headers().get("connection").is_none());
        assert_eq!(
            request.headers().get("accept").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_unmappable_header_skipped_not_fatal() {
        let upstream = HttpUpstream::new(base());
        let request = upstream
            .build_request(&descriptor(
                "GET",
                vec![("bad header name".to_string(), "x".to_string())],
            ))
            .unwrap();

        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_invalid_method_rejected() {
        let upstream = HttpUpstream::new(base());
        let result = upstream.build_request(&descriptor("NOT A METHOD", vec![]));

        assert!(result.is_err());
    }
}
