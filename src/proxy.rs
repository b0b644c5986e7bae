//! Proxy core: the fetch-or-serve decision engine

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheKey, CacheStore, RequestMirror};
use crate::config::{BaseUrl, Config};
use crate::upstream::{StreamedResponse, Upstream};
use crate::Result;

/// One inbound request, immutable for the duration of its handling
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method (e.g. "GET", "POST")
    pub method: String,
    /// Request path
    pub path: String,
    /// Raw query string, if any
    pub query: Option<String>,
    /// Request headers, case-preserving
    pub headers: Vec<(String, String)>,
    /// Request body, possibly empty
    pub body: Vec<u8>,
}

/// Outcome of handling one request
pub enum Reply {
    /// Response served from (or just stored into) the cache
    Cached(CacheEntry),
    /// Response relayed from upstream without caching
    Streamed(StreamedResponse),
}

/// Orchestrates pass-through vs. cache-or-fetch per request.
///
/// The single entry point consumed by the HTTP listener. Safe under
/// arbitrary concurrent invocation; only same-key first-touch fetches ever
/// block one another, via the store's single-flight lock.
pub struct ProxyCore<U> {
    policy: Config,
    base: BaseUrl,
    store: Arc<CacheStore>,
    upstream: U,
}

impl<U: Upstream> ProxyCore<U> {
    /// Create a proxy core from its injected collaborators
    pub fn new(policy: Config, store: Arc<CacheStore>, upstream: U) -> Result<Self> {
        let base = policy.base()?;
        Ok(Self {
            policy,
            base,
            store,
            upstream,
        })
    }

    /// Handle one request.
    ///
    /// Methods without caching enabled stream straight through with no
    /// cache side effects. Cacheable methods look up the store and, on a
    /// miss, fetch upstream under the key's single-flight lock, persist,
    /// and reply with the stored entry.
    pub async fn handle(&self, descriptor: RequestDescriptor) -> Result<Reply> {
        if !self.policy.should_cache(&descriptor.method) {
            debug!("pass-through: {} {}", descriptor.method, descriptor.path);
            let streamed = self.upstream.forward_streaming(&descriptor).await?;
            return Ok(Reply::Streamed(streamed));
        }

        let key = CacheKey::derive(
            &self.base,
            &descriptor.path,
            &descriptor.method,
            descriptor.query.as_deref().unwrap_or(""),
            &descriptor.body,
        );

        if let Some(entry) = self.store.get(&key)? {
            info!("cache hit: {key}");
            return Ok(Reply::Cached(entry));
        }

        info!("cache miss, fetching upstream: {key}");
        let entry = self
            .store
            .fetch_or_create(&key, || async {
                let captured = self.upstream.forward_captured(&descriptor).await?;
                Ok(CacheEntry::from_capture(
                    captured.status,
                    &captured.headers,
                    captured.body,
                    RequestMirror {
                        headers: descriptor.headers.clone(),
                        body: descriptor.body.clone(),
                    },
                ))
            })
            .await?;

        Ok(Reply::Cached(entry))
    }

    /// The cache store backing this core
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}
