//! Cache entry and the flat header file codec

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Result, SnapError};

/// Reserved key for the response status inside `response_headers`.
///
/// HTTP header names cannot contain `@`, so this never collides with a
/// real header. Files written before status persistence existed simply
/// lack the key and load as 200.
const STATUS_KEY: &str = "@status";

/// Mirrored copy of the originating request, kept for audit/debugging.
///
/// Never consulted during lookup; the fingerprint alone identifies an
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMirror {
    /// Request headers as received
    pub headers: Vec<(String, String)>,
    /// Request body, raw bytes
    pub body: Vec<u8>,
}

/// One captured exchange: response headers + body, with the originating
/// request mirrored alongside.
///
/// Entries are immutable once written; a second fetch for the same key
/// overwrites wholesale rather than updating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Response status code
    pub status: u16,
    /// Response headers, key unique
    pub headers: Vec<(String, String)>,
    /// Response body, raw bytes
    pub body: Vec<u8>,
    /// Mirror of the request that produced this entry
    pub request: RequestMirror,
}

impl CacheEntry {
    /// Build an entry from a captured upstream response.
    ///
    /// When the upstream repeated a header, the first value wins; later
    /// occurrences are dropped so the persisted mapping stays key-unique.
    #[must_use]
    pub fn from_capture(
        status: u16,
        headers: &[(String, String)],
        body: Vec<u8>,
        request: RequestMirror,
    ) -> Self {
        Self {
            status,
            headers: dedup_first_wins(headers),
            body,
            request,
        }
    }
}

/// Drop repeated header keys, keeping the first value of each
fn dedup_first_wins(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut seen: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        if !seen.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) {
            seen.push((name.clone(), value.clone()));
        }
    }
    seen
}

/// Serialize a header mapping to the flat `key=value` text format.
///
/// One pair per line, preceded by a comment line recording the capture
/// time. Values may contain `=`; the parser splits on the first one.
#[must_use]
pub fn serialize_headers(status: Option<u16>, headers: &[(String, String)]) -> String {
    let captured_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    let mut out = format!("# captured at {captured_at} (unix seconds)\n");
    if let Some(status) = status {
        out.push_str(&format!("{STATUS_KEY}={status}\n"));
    }
    for (name, value) in headers {
        out.push_str(&format!("{name}={value}\n"));
    }
    out
}

/// Parse the flat header file format back into (status, headers).
///
/// Comment lines and blank lines are skipped. Duplicate keys are
/// last-value-wins on load; capture-side deduplication means well-formed
/// files never contain them.
pub fn parse_headers(path: &str, text: &str) -> Result<(u16, Vec<(String, String)>)> {
    let mut status = 200u16;
    let mut headers: Vec<(String, String)> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, value) = line.split_once('=').ok_or_else(|| {
            SnapError::InvalidHeaderFile {
                path: path.to_string(),
                reason: format!("line {} has no '='", lineno + 1),
            }
        })?;

        if name == STATUS_KEY {
            status = value
                .parse()
                .map_err(|_| SnapError::InvalidHeaderFile {
                    path: path.to_string(),
                    reason: format!("bad status '{value}'"),
                })?;
            continue;
        }

        if let Some(existing) = headers.iter_mut().find(|(n, _)| n == name) {
            existing.1 = value.to_string();
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok((status, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> Vec<(String, String)> {
        vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("etag".to_string(), "\"abc=123\"".to_string()),
        ]
    }

    #[test]
    fn test_header_round_trip() {
        let text = serialize_headers(Some(404), &sample_headers());
        let (status, headers) = parse_headers("response_headers", &text).unwrap();

        assert_eq!(status, 404);
        assert_eq!(headers, sample_headers());
    }

    #[test]
    fn test_value_with_equals_survives() {
        let text = serialize_headers(None, &[("etag".to_string(), "a=b=c".to_string())]);
        let (_, headers) = parse_headers("request_headers", &text).unwrap();

        assert_eq!(headers, vec![("etag".to_string(), "a=b=c".to_string())]);
    }

    #[test]
    fn test_comment_line_present() {
        let text = serialize_headers(Some(200), &[]);
        assert!(text.starts_with("# captured at "));
    }

    #[test]
    fn test_status_defaults_to_200() {
        let (status, headers) =
            parse_headers("response_headers", "content-length=4\n").unwrap();

        assert_eq!(status, 200);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_duplicate_keys_last_wins_on_load() {
        let (_, headers) =
            parse_headers("response_headers", "x-a=1\nx-a=2\n").unwrap();

        assert_eq!(headers, vec![("x-a".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_malformed_line_rejected() {
        let result = parse_headers("response_headers", "no equals sign\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_capture_dedup_first_wins() {
        let entry = CacheEntry::from_capture(
            200,
            &[
                ("Set-Cookie".to_string(), "first".to_string()),
                ("set-cookie".to_string(), "second".to_string()),
            ],
            vec![],
            RequestMirror::default(),
        );

        assert_eq!(
            entry.headers,
            vec![("Set-Cookie".to_string(), "first".to_string())]
        );
    }
}
