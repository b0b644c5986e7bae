//! Request fingerprinting for deterministic cache key derivation

use md5::{Digest, Md5};

/// Compute the fingerprint token for a request.
///
/// The token is the lower-cased method as a namespace prefix, an
/// underscore, then the hex MD5 digest of the query string concatenated
/// with the body. Identical (method, query, body) triples always yield the
/// same token; changing any one of them yields a different token. Empty
/// query and empty body are valid inputs and are hashed, not skipped.
///
/// Hex output is filesystem-safe, so the token can be embedded directly in
/// a cache directory name.
#[must_use]
pub fn fingerprint(method: &str, query: &str, body: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(query.as_bytes());
    hasher.update(body);

    let digest = hasher.finalize();
    format!("{}_{}", method.to_lowercase(), hex::encode(digest))
}
