//! Cache key derivation and path resolution

use std::fmt;
use std::path::PathBuf;

use crate::config::BaseUrl;
use crate::fingerprint;

/// Composite cache key for one captured exchange.
///
/// Resolves to a relative directory
/// `<scheme>/<host>/<port>/<seg1>/../<segN>/<method>_<digest>` under the
/// cache root; the same canonical string doubles as the in-memory lookup
/// key. Each path segment stays its own directory level, so `/a/b` and
/// `/a_b` can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scheme: String,
    host: String,
    port: u16,
    segments: Vec<String>,
    token: String,
}

impl CacheKey {
    /// Derive a cache key from the upstream target and request content
    #[must_use]
    pub fn derive(base: &BaseUrl, path: &str, method: &str, query: &str, body: &[u8]) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();

        Self {
            scheme: base.scheme.clone(),
            host: base.host.clone(),
            port: base.port,
            segments,
            token: fingerprint::fingerprint(method, query, body),
        }
    }

    /// Fingerprint token (final path segment)
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Canonical string encoding, used as the memory-tier map key
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Relative directory for this key under the cache root
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        dir.push(&self.scheme);
        dir.push(&self.host);
        dir.push(self.port.to_string());
        for segment in &self.segments {
            dir.push(segment);
        }
        dir.push(&self.token);
        dir
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scheme, self.host, self.port)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        write!(f, "/{}", self.token)
    }
}
