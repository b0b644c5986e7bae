//! HTTP listener wiring the proxy core to the network

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::cache::{CacheEntry, CacheStore};
use crate::config::Config;
use crate::proxy::{ProxyCore, Reply, RequestDescriptor};
use crate::upstream::{HttpUpstream, StreamedResponse};
use crate::{Result, SnapError};

/// Hop-by-hop headers that never replay onto a newly framed response
const HOP_HEADERS: &[&str] = &["transfer-encoding", "connection", "keep-alive"];

type ProxyBody = BoxBody<Bytes, SnapError>;

/// HTTP server accepting arbitrary methods and paths under `/*`
pub struct Server {
    config: Config,
    core: Arc<ProxyCore<HttpUpstream>>,
}

impl Server {
    /// Wire up store, upstream client, and proxy core from configuration
    pub fn new(config: Config) -> Result<Self> {
        let base = config.base()?;
        let store = Arc::new(CacheStore::new(config.cache_root.clone()));
        let core = Arc::new(ProxyCore::new(
            config.clone(),
            store,
            HttpUpstream::new(base),
        )?);

        Ok(Self { config, core })
    }

    /// Accept connections until interrupted
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.listen_port));
        let listener = TcpListener::bind(addr).await?;

        info!("Listening on {} (proxying to {})", addr, self.config.base_url);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let core = Arc::clone(&self.core);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |request| {
                                    let core = Arc::clone(&core);
                                    async move { dispatch(core, request).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    error!("Connection error from {peer_addr}: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {e}");
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Hyper request in, hyper response out; never fails the connection
async fn dispatch(
    core: Arc<ProxyCore<HttpUpstream>>,
    request: Request<Incoming>,
) -> std::result::Result<Response<ProxyBody>, std::convert::Infallible> {
    let response = match read_descriptor(request).await {
        Ok(descriptor) => match core.handle(descriptor).await {
            Ok(Reply::Cached(entry)) => cached_response(&entry),
            Ok(Reply::Streamed(streamed)) => streamed_response(streamed),
            Err(e) => {
                error!("Request failed: {e}");
                error_response(&e)
            }
        },
        Err(e) => {
            error!("Failed to read request: {e}");
            error_response(&e)
        }
    };

    Ok(response)
}

/// Collect an inbound hyper request into a descriptor
async fn read_descriptor<B>(request: Request<B>) -> Result<RequestDescriptor>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(ToString::to_string);

    let headers = request
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|e| SnapError::InvalidRequest(format!("Failed to read request body: {e}")))?
        .to_bytes()
        .to_vec();

    Ok(RequestDescriptor {
        method,
        path,
        query,
        headers,
        body,
    })
}

/// Render a cache entry as a buffered response
///
/// # Panics
///
/// Panics if the response builder fails (cannot happen with a bare status)
#[must_use]
fn cached_response(entry: &CacheEntry) -> Response<ProxyBody> {
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
    let mut response = Response::builder()
        .status(status)
        .body(full_body(entry.body.clone()))
        .expect("Failed to build response");

    apply_headers(response.headers_mut(), &entry.headers);
    response
}

/// Relay a streamed upstream response as-is
///
/// # Panics
///
/// Panics if the response builder fails (cannot happen with a bare status)
#[must_use]
fn streamed_response(streamed: StreamedResponse) -> Response<ProxyBody> {
    let status = StatusCode::from_u16(streamed.status).unwrap_or(StatusCode::OK);
    let mut response = Response::builder()
        .status(status)
        .body(streamed.body)
        .expect("Failed to build response");

    apply_headers(response.headers_mut(), &streamed.headers);
    response
}

/// Map an error to a failed response
///
/// # Panics
///
/// Panics if the response builder fails (cannot happen with a bare status)
#[must_use]
fn error_response(error: &SnapError) -> Response<ProxyBody> {
    let status = match error {
        SnapError::Upstream(_) => StatusCode::BAD_GATEWAY,
        SnapError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    Response::builder()
        .status(status)
        .body(full_body(format!("Error: {error}").into_bytes()))
        .expect("Failed to build response")
}

/// Copy headers best-effort, skipping hop-by-hop and unmappable ones
fn apply_headers(target: &mut hyper::HeaderMap, headers: &[(String, String)]) {
    use hyper::header::{HeaderName, HeaderValue};

    for (name, value) in headers {
        if HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        target.insert(name, value);
    }
}

fn full_body(bytes: Vec<u8>) -> ProxyBody {
    Full::new(Bytes::from(bytes))
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestMirror;

    fn entry() -> CacheEntry {
        CacheEntry {
            status: 404,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("transfer-encoding".to_string(), "chunked".to_string()),
            ],
            body: b"{\"error\":\"missing\"}".to_vec(),
            request: RequestMirror::default(),
        }
    }

    #[test]
    fn test_cached_response_status_and_headers() {
        let response = cached_response(&entry());

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        // hop-by-hop headers never replay against a re-framed body
        assert!(response.headers().get("transfer-encoding").is_none());
    }

    #[test]
    fn test_error_response_mapping() {
        let upstream = error_response(&SnapError::Upstream("down".to_string()));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let io = error_response(&SnapError::Io(std::io::Error::other("disk full")));
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bad = error_response(&SnapError::InvalidRequest("nope".to_string()));
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_read_descriptor() {
        let request = Request::builder()
            .method("POST")
            .uri("http://localhost:8090/v1/items?page=1")
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(b"{\"id\":1}")))
            .unwrap();

        let descriptor = read_descriptor(request).await.unwrap();

        assert_eq!(descriptor.method, "POST");
        assert_eq!(descriptor.path, "/v1/items");
        assert_eq!(descriptor.query.as_deref(), Some("page=1"));
        assert_eq!(descriptor.body, b"{\"id\":1}");
        assert_eq!(
            descriptor.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
    }

    #[tokio::test]
    async fn test_read_descriptor_empty_body() {
        let request = Request::builder()
            .method("GET")
            .uri("/v1/items")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let descriptor = read_descriptor(request).await.unwrap();
        assert!(descriptor.body.is_empty());
        assert!(descriptor.query.is_none());
    }
}
