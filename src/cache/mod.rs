//! Layered cache store
//!
//! Memory-first, disk-authoritative storage of captured exchanges, keyed by
//! request fingerprint, with a single-flight fetch guarantee.

mod entry;
mod key;
mod store;

pub use entry::{CacheEntry, RequestMirror};
pub use key::CacheKey;
pub use store::{CacheStats, CacheStore};

/// File names inside one cache entry directory
pub const RESPONSE_HEADERS_FILE: &str = "response_headers";
/// Captured response body, raw bytes
pub const RESPONSE_BODY_FILE: &str = "response_body";
/// Mirrored request headers (audit only, never used for lookup)
pub const REQUEST_HEADERS_FILE: &str = "request_headers";
/// Mirrored request body, raw bytes
pub const REQUEST_BODY_FILE: &str = "request_body";
