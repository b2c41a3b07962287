//! Request, identity and encoding types shared by server and client
//!
//! These types form the vocabulary of the binding layer:
//!
//! - [`Verb`]: the HTTP method an operation answers to
//! - [`ResourceIdentity`]: the `(type, id, version)` triple a request targets
//! - [`PatchEncoding`]: the content-type variants a partial update may use
//! - [`InboundRequest`]: read-only view of a request received by the server
//! - [`OutboundInvocation`]: a fully built request ready for a transport
//!
//! # Identities
//!
//! Identities use the FHIR relative form: `Patient/123` or
//! `Patient/123/_history/2`. An identity may omit its resource type, in which
//! case it inherits the type of the operation it is used with.

use crate::codec;
use crate::error::{Error, Result};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};
use mime::Mime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path segment that introduces a version id
pub const HISTORY_SEGMENT: &str = "_history";

/// HTTP verb an operation is bound to
///
/// Parsing is exact: `"patch"` is not `PATCH`. A request is never coerced
/// onto an operation registered for another verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Verb {
    /// Canonical upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
            Verb::Head => "HEAD",
            Verb::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "PATCH" => Ok(Verb::Patch),
            "DELETE" => Ok(Verb::Delete),
            "HEAD" => Ok(Verb::Head),
            "OPTIONS" => Ok(Verb::Options),
            other => Err(Error::InvalidRequest(format!("Unknown HTTP verb: {other}"))),
        }
    }
}

impl From<Verb> for http::Method {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => http::Method::GET,
            Verb::Post => http::Method::POST,
            Verb::Put => http::Method::PUT,
            Verb::Patch => http::Method::PATCH,
            Verb::Delete => http::Method::DELETE,
            Verb::Head => http::Method::HEAD,
            Verb::Options => http::Method::OPTIONS,
        }
    }
}

impl TryFrom<&http::Method> for Verb {
    type Error = Error;

    fn try_from(method: &http::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

/// Check a resource type name: an upper-case ASCII letter followed by ASCII
/// alphanumerics
pub fn is_valid_resource_type(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

/// Check a logical id or version id: `[A-Za-z0-9\-\.]{1,64}`
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Identity of a resource instance
///
/// Immutable once constructed; the `with_*` methods return new values.
///
/// # Examples
///
/// ```rust
/// use restbind_core::ResourceIdentity;
///
/// let id = ResourceIdentity::parse("Patient/123/_history/2").unwrap();
/// assert_eq!(id.resource_type(), Some("Patient"));
/// assert_eq!(id.id(), "123");
/// assert_eq!(id.version(), Some("2"));
/// assert_eq!(id.to_string(), "Patient/123/_history/2");
///
/// let bare = ResourceIdentity::untyped("123").with_resource_type("Patient");
/// assert_eq!(bare.to_string(), "Patient/123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl ResourceIdentity {
    /// Identity with a known resource type
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            id: id.into(),
            version: None,
        }
    }

    /// Identity whose type will be inherited from the operation
    pub fn untyped(id: impl Into<String>) -> Self {
        Self {
            resource_type: None,
            id: id.into(),
            version: None,
        }
    }

    /// Parse `Type/id`, `Type/id/_history/vid`, `id` or `id/_history/vid`
    ///
    /// Leading and trailing slashes are ignored. Every component is
    /// validated; anything else is rejected as an invalid request.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('/').filter(|p| !p.is_empty()).collect();
        let invalid = || Error::InvalidRequest(format!("Invalid resource identity: '{value}'"));

        let (resource_type, id, version) = match parts.as_slice() {
            [id] => (None, *id, None),
            [id, HISTORY_SEGMENT, version] => (None, *id, Some(*version)),
            [resource_type, id] => (Some(*resource_type), *id, None),
            [resource_type, id, HISTORY_SEGMENT, version] => {
                (Some(*resource_type), *id, Some(*version))
            }
            _ => return Err(invalid()),
        };

        if resource_type.is_some_and(|t| !is_valid_resource_type(t))
            || !is_valid_id(id)
            || version.is_some_and(|v| !is_valid_id(v))
        {
            return Err(invalid());
        }

        Ok(Self {
            resource_type: resource_type.map(str::to_string),
            id: id.to_string(),
            version: version.map(str::to_string),
        })
    }

    /// Same identity pinned to a version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Same identity with its resource type replaced
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Same identity without its version
    pub fn to_unqualified_versionless(&self) -> Self {
        Self {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
            version: None,
        }
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource_type.as_deref()
    }

    pub fn has_resource_type(&self) -> bool {
        self.resource_type.is_some()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Path segments in request order, e.g. `["Patient", "123", "_history", "2"]`
    pub fn path_segments(&self) -> Vec<&str> {
        let mut segments = Vec::with_capacity(4);
        if let Some(resource_type) = &self.resource_type {
            segments.push(resource_type.as_str());
        }
        segments.push(self.id.as_str());
        if let Some(version) = &self.version {
            segments.push(HISTORY_SEGMENT);
            segments.push(version.as_str());
        }
        segments
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_segments().join("/"))
    }
}

impl FromStr for ResourceIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// How the body of a partial update is structured
///
/// Each variant's MIME string is part of the wire contract and must match
/// what conformant peers send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatchEncoding {
    /// RFC 6902 JSON Patch
    JsonPatch,
    /// RFC 7396 JSON Merge Patch
    JsonMergePatch,
    /// RFC 5261 XML Patch
    XmlPatch,
    /// FHIRPath Patch, `Parameters` resource as JSON
    FhirPatchJson,
    /// FHIRPath Patch, `Parameters` resource as XML
    FhirPatchXml,
}

impl PatchEncoding {
    /// Every supported encoding, in declaration order
    pub const ALL: [PatchEncoding; 5] = [
        PatchEncoding::JsonPatch,
        PatchEncoding::JsonMergePatch,
        PatchEncoding::XmlPatch,
        PatchEncoding::FhirPatchJson,
        PatchEncoding::FhirPatchXml,
    ];

    /// Canonical MIME content type
    pub fn content_type(&self) -> &'static str {
        match self {
            PatchEncoding::JsonPatch => "application/json-patch+json",
            PatchEncoding::JsonMergePatch => "application/merge-patch+json",
            PatchEncoding::XmlPatch => "application/xml-patch+xml",
            PatchEncoding::FhirPatchJson => "application/fhir+json",
            PatchEncoding::FhirPatchXml => "application/fhir+xml",
        }
    }

    /// Derive the encoding from a `Content-Type` header value
    ///
    /// Media-type parameters such as `charset` are ignored and the essence
    /// is compared case-insensitively. A missing, unparseable or unknown
    /// value is an [`Error::UnsupportedContentType`].
    ///
    /// ```rust
    /// use restbind_core::PatchEncoding;
    ///
    /// let encoding = PatchEncoding::from_content_type(Some("application/json-patch+json; charset=utf-8"));
    /// assert_eq!(encoding.unwrap(), PatchEncoding::JsonPatch);
    /// assert!(PatchEncoding::from_content_type(Some("text/plain")).is_err());
    /// assert!(PatchEncoding::from_content_type(None).is_err());
    /// ```
    pub fn from_content_type(header: Option<&str>) -> Result<Self> {
        let raw = match header.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => raw,
            None => return Err(Error::unsupported_content_type(None, &Self::ALL)),
        };

        let mime: Mime = raw
            .parse()
            .map_err(|_| Error::unsupported_content_type(Some(raw), &Self::ALL))?;

        Self::ALL
            .iter()
            .copied()
            .find(|encoding| mime.essence_str().eq_ignore_ascii_case(encoding.content_type()))
            .ok_or_else(|| Error::unsupported_content_type(Some(raw), &Self::ALL))
    }
}

impl fmt::Display for PatchEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

/// Read-only view of a request handed over by the transport
///
/// The path is already split into percent-decoded segments and the query
/// string into ordered, decoded pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    pub verb: Verb,
    pub path_segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Request with no query, headers or body
    pub fn new<I, S>(verb: Verb, path_segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            verb,
            path_segments: path_segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build from a raw request target such as `/Patient/123?_format=json`
    pub fn parse(verb: Verb, target: &str, headers: HeaderMap, body: impl Into<Bytes>) -> Result<Self> {
        let (path_segments, query) = codec::split_target(target)?;
        Ok(Self {
            verb,
            path_segments,
            query,
            headers,
            body: body.into(),
        })
    }

    /// Add a header; rejects values that are not valid header text
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("Invalid header value for {name}: {e}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Set the `Content-Type` header
    pub fn with_content_type(self, content_type: &str) -> Result<Self> {
        self.with_header(CONTENT_TYPE, content_type)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Declared `Content-Type`, if any
    pub fn content_type(&self) -> Option<String> {
        codec::content_type(&self.headers)
    }

    /// All values of a query parameter in request order
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// Path as a string, for diagnostics
    pub fn path(&self) -> String {
        format!("/{}", self.path_segments.join("/"))
    }
}

/// Fully built request for a transport to send
///
/// Produced once per client call and never modified afterwards; the fields
/// are only reachable through accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundInvocation {
    verb: Verb,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
}

impl OutboundInvocation {
    pub fn new(
        verb: Verb,
        path: impl Into<String>,
        query: Vec<(String, String)>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            verb,
            path: path.into(),
            query,
            headers,
            body: body.into(),
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Resource path without query string, e.g. `Patient/123`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in the order they will be sent
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<String> {
        codec::content_type(&self.headers)
    }

    /// Path plus encoded query string, e.g. `Patient/123?_format=json`
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, codec::encode_query(&self.query))
        }
    }

    /// Absolute URL against a server base such as `http://host/fhir`
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.target())
    }

    /// The request a conformant server receives for this invocation
    pub fn to_inbound(&self) -> Result<InboundRequest> {
        InboundRequest::parse(
            self.verb,
            &self.target(),
            self.headers.clone(),
            self.body.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verb_parse_is_exact() {
        assert_eq!("PATCH".parse::<Verb>().unwrap(), Verb::Patch);
        assert!("patch".parse::<Verb>().is_err());
        assert!("PATCHX".parse::<Verb>().is_err());
    }

    #[test]
    fn test_verb_http_method_conversion() {
        for verb in [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete, Verb::Head, Verb::Options] {
            let method: http::Method = verb.into();
            assert_eq!(Verb::try_from(&method).unwrap(), verb);
            assert_eq!(method.as_str(), verb.as_str());
        }
        assert!(Verb::try_from(&http::Method::TRACE).is_err());
    }

    #[test]
    fn test_identity_parse_forms() {
        let typed = ResourceIdentity::parse("Patient/123").unwrap();
        assert_eq!(typed, ResourceIdentity::new("Patient", "123"));

        let versioned = ResourceIdentity::parse("/Patient/123/_history/2/").unwrap();
        assert_eq!(versioned, ResourceIdentity::new("Patient", "123").with_version("2"));

        let bare = ResourceIdentity::parse("abc-1.2").unwrap();
        assert!(!bare.has_resource_type());
        assert_eq!(bare.id(), "abc-1.2");

        let bare_versioned = ResourceIdentity::parse("123/_history/7").unwrap();
        assert_eq!(bare_versioned.version(), Some("7"));
        assert_eq!(bare_versioned.resource_type(), None);
    }

    #[test]
    fn test_identity_parse_rejects_garbage() {
        for value in ["", "patient/1", "Patient/1 2", "Patient/1/_hist/2", "A/B/C", "Patient/1/_history/"] {
            assert!(ResourceIdentity::parse(value).is_err(), "{value} should be rejected");
        }
        let too_long = "x".repeat(65);
        assert!(ResourceIdentity::parse(&too_long).is_err());
    }

    #[test]
    fn test_identity_display_and_versionless() {
        let id = ResourceIdentity::new("Patient", "123").with_version("4");
        assert_eq!(id.to_string(), "Patient/123/_history/4");
        assert_eq!(id.to_unqualified_versionless().to_string(), "Patient/123");
        assert_eq!(ResourceIdentity::untyped("9").to_string(), "9");
    }

    #[test]
    fn test_identity_serialization() {
        let id = ResourceIdentity::new("Patient", "123");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"resourceType": "Patient", "id": "123"}));
    }

    #[test]
    fn test_patch_encoding_content_types() {
        for encoding in PatchEncoding::ALL {
            let derived = PatchEncoding::from_content_type(Some(encoding.content_type())).unwrap();
            assert_eq!(derived, encoding);
        }
        assert_eq!(
            PatchEncoding::JsonMergePatch.content_type(),
            "application/merge-patch+json"
        );
    }

    #[test]
    fn test_patch_encoding_ignores_params_and_case() {
        let encoding =
            PatchEncoding::from_content_type(Some("  Application/JSON-Patch+JSON; charset=UTF-8")).unwrap();
        assert_eq!(encoding, PatchEncoding::JsonPatch);
    }

    #[test]
    fn test_patch_encoding_rejects_unknown() {
        match PatchEncoding::from_content_type(Some("text/plain")) {
            Err(Error::UnsupportedContentType { found, supported }) => {
                assert_eq!(found.as_deref(), Some("text/plain"));
                assert_eq!(supported.len(), PatchEncoding::ALL.len());
            }
            other => panic!("Expected UnsupportedContentType, got {other:?}"),
        }
        assert!(PatchEncoding::from_content_type(Some("not a mime")).is_err());
        assert!(PatchEncoding::from_content_type(Some("   ")).is_err());
    }

    #[test]
    fn test_inbound_request_parse() {
        let request = InboundRequest::parse(
            Verb::Patch,
            "/Patient/123?_format=json&tag=a%20b",
            HeaderMap::new(),
            "{}",
        )
        .unwrap()
        .with_content_type("application/merge-patch+json")
        .unwrap();

        assert_eq!(request.path_segments, vec!["Patient", "123"]);
        assert_eq!(request.query_values("_format"), vec!["json"]);
        assert_eq!(request.query_values("tag"), vec!["a b"]);
        assert_eq!(request.content_type().as_deref(), Some("application/merge-patch+json"));
        assert_eq!(request.path(), "/Patient/123");
        assert_eq!(request.body, Bytes::from_static(b"{}"));
    }

    #[test]
    fn test_inbound_rejects_bad_header() {
        let result = InboundRequest::new(Verb::Patch, ["Patient", "1"]).with_content_type("bad\nvalue");
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_outbound_target_and_url() {
        let invocation = OutboundInvocation::new(
            Verb::Patch,
            "Patient/123",
            vec![("_format".to_string(), "json".to_string()), ("q".to_string(), "a&b".to_string())],
            HeaderMap::new(),
            Bytes::from_static(b"{}"),
        );

        assert_eq!(invocation.target(), "Patient/123?_format=json&q=a%26b");
        assert_eq!(
            invocation.url("http://example.org/fhir/"),
            "http://example.org/fhir/Patient/123?_format=json&q=a%26b"
        );

        let inbound = invocation.to_inbound().unwrap();
        assert_eq!(inbound.path_segments, vec!["Patient", "123"]);
        assert_eq!(inbound.query_values("q"), vec!["a&b"]);
    }
}
