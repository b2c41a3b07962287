//! Codec for request targets, query strings and content-type headers
//!
//! The server side receives raw request targets (`/Patient/123?_format=json`)
//! and the client side must produce them. This module keeps both directions
//! in one place so that whatever the client encodes, the server decodes back
//! to the same segments and pairs.
//!
//! # Encoding Rules
//!
//! - Path segments and query names/values are percent-encoded with
//!   `urlencoding`, which leaves only `A-Z a-z 0-9 - _ . ~` untouched.
//! - On decode, `+` in a query string is read as a space (form encoding).
//! - Empty path segments are dropped, so `//Patient/1/` equals `Patient/1`.
//!
//! # Examples
//!
//! ```rust
//! use restbind_core::codec;
//!
//! let (segments, query) = codec::split_target("/Patient/123?_format=json").unwrap();
//! assert_eq!(segments, vec!["Patient", "123"]);
//! assert_eq!(query, vec![("_format".to_string(), "json".to_string())]);
//!
//! let encoded = codec::encode_query(&query);
//! assert_eq!(encoded, "_format=json");
//! ```

use crate::error::{Error, Result};
use crate::types::HISTORY_SEGMENT;
use http::header::CONTENT_TYPE;
use http::HeaderMap;

/// Shape of a request path as far as instance-level operations care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape<'a> {
    /// `Type/id` or `Type/id/_history/vid`
    Instance {
        resource_type: &'a str,
        id: &'a str,
        version: Option<&'a str>,
    },
    /// `Type` with no id
    TypeOnly(&'a str),
    /// Anything else (empty path, extra segments, system-level operations)
    Other,
}

/// Classify decoded path segments
pub fn classify_path(segments: &[String]) -> PathShape<'_> {
    match segments {
        [resource_type] => PathShape::TypeOnly(resource_type),
        [resource_type, id] => PathShape::Instance {
            resource_type,
            id,
            version: None,
        },
        [resource_type, id, history, version] if history == HISTORY_SEGMENT => {
            PathShape::Instance {
                resource_type,
                id,
                version: Some(version),
            }
        }
        _ => PathShape::Other,
    }
}

/// Split a request target into decoded path segments and query pairs
///
/// Any fragment (`#...`) is discarded. Fails only when a component is not
/// valid UTF-8 after percent-decoding.
pub fn split_target(target: &str) -> Result<(Vec<String>, Vec<(String, String)>)> {
    let without_fragment = target.split('#').next().unwrap_or_default();
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (without_fragment, ""),
    };

    let segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(decode_component)
        .collect::<Result<Vec<_>>>()?;

    Ok((segments, decode_query(query)?))
}

/// Decode an `a=1&b=2` query string into ordered pairs
///
/// A name without `=` gets an empty value; empty pieces (`a=1&&b=2`) are
/// skipped.
pub fn decode_query(query: &str) -> Result<Vec<(String, String)>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((decode_form(name)?, decode_form(value)?))
        })
        .collect()
}

/// Encode ordered pairs as a query string, preserving their order
pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode path segments, joining them with `/`
pub fn encode_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|segment| urlencoding::encode(segment.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `Content-Type` header value, if present
///
/// Non-ASCII bytes are replaced rather than rejected so that the value can
/// still be quoted back in an unsupported-content-type diagnostic.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

fn decode_component(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| Error::InvalidRequest(format!("Invalid percent-encoding in '{raw}': {e}")))
}

fn decode_form(raw: &str) -> Result<String> {
    decode_component(&raw.replace('+', " "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn segments(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_instance_paths() {
        let plain = segments(&["Patient", "123"]);
        assert_eq!(
            classify_path(&plain),
            PathShape::Instance {
                resource_type: "Patient",
                id: "123",
                version: None
            }
        );

        let versioned = segments(&["Patient", "123", "_history", "3"]);
        assert_eq!(
            classify_path(&versioned),
            PathShape::Instance {
                resource_type: "Patient",
                id: "123",
                version: Some("3")
            }
        );
    }

    #[test]
    fn test_classify_other_paths() {
        assert_eq!(classify_path(&segments(&["Patient"])), PathShape::TypeOnly("Patient"));
        assert_eq!(classify_path(&[]), PathShape::Other);
        assert_eq!(
            classify_path(&segments(&["Patient", "1", "$validate"])),
            PathShape::Other
        );
        assert_eq!(
            classify_path(&segments(&["Patient", "1", "_other", "2"])),
            PathShape::Other
        );
    }

    #[test]
    fn test_split_target() {
        let (path, query) = split_target("//Patient/a%2Fb/?x=1&&y&z=a+b#frag").unwrap();
        assert_eq!(path, segments(&["Patient", "a/b"]));
        assert_eq!(
            query,
            vec![
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), String::new()),
                ("z".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_target_rejects_invalid_utf8() {
        assert!(split_target("/Patient/%FF").is_err());
    }

    #[test]
    fn test_query_encoding_preserves_order() {
        let pairs = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "x y&z".to_string()),
            ("b".to_string(), "3".to_string()),
        ];
        let encoded = encode_query(&pairs);
        assert_eq!(encoded, "b=2&a=x%20y%26z&b=3");
        assert_eq!(decode_query(&encoded).unwrap(), pairs);
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path(&["Patient", "12 3"]), "Patient/12%203");
        assert_eq!(encode_path::<&str>(&[]), "");
    }

    #[test]
    fn test_content_type_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_type(&headers), None);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json-patch+json"));
        assert_eq!(content_type(&headers).as_deref(), Some("application/json-patch+json"));
    }
}
