//! Request matching
//!
//! Matching decides whether a descriptor is responsible for a request. It
//! looks at the verb, the shape of the path and the declared content type,
//! and nothing else: no arguments are extracted here.
//!
//! The outcome is three-way so the dispatcher can explain a miss:
//!
//! - [`MatchOutcome::Matched`]: this operation serves the request
//! - [`MatchOutcome::EncodingNotAccepted`]: right verb and path, valid patch
//!   encoding, but one this operation does not accept
//! - [`MatchOutcome::NoMatch`]: wrong path, or right path with the wrong verb
//!
//! A request with the right verb and path but a missing or unknown content
//! type is neither: it fails with [`Error::UnsupportedContentType`].

use restbind_core::codec::{classify_path, PathShape};
use restbind_core::{Error, InboundRequest, OperationDescriptor, PatchEncoding, Result};

/// Why a request did not match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// The path is served by this operation, the verb is not
    Verb,
    /// The path is not served by this operation
    Path,
}

/// Result of matching one descriptor against one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(PatchEncoding),
    EncodingNotAccepted(PatchEncoding),
    NoMatch(Mismatch),
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}

/// Decides whether a descriptor serves a request
pub trait RequestMatcher: Send + Sync {
    fn match_request(
        &self,
        descriptor: &OperationDescriptor,
        request: &InboundRequest,
    ) -> Result<MatchOutcome>;
}

/// Matcher for instance-level PATCH operations
///
/// Serves `Type/id` and `Type/id/_history/vid` where `Type` satisfies the
/// descriptor's resource binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchMatcher;

impl RequestMatcher for PatchMatcher {
    fn match_request(
        &self,
        descriptor: &OperationDescriptor,
        request: &InboundRequest,
    ) -> Result<MatchOutcome> {
        let path_served = match classify_path(&request.path_segments) {
            PathShape::Instance { resource_type, .. } => {
                descriptor.resource_binding().accepts(resource_type)
            }
            PathShape::TypeOnly(_) | PathShape::Other => false,
        };
        if !path_served {
            return Ok(MatchOutcome::NoMatch(Mismatch::Path));
        }

        if request.verb != descriptor.verb() {
            return Ok(MatchOutcome::NoMatch(Mismatch::Verb));
        }

        let content_type = request.content_type();
        let encoding = PatchEncoding::from_content_type(content_type.as_deref()).map_err(|_| {
            Error::unsupported_content_type(content_type.as_deref(), descriptor.accepted_encodings())
        })?;

        if descriptor.accepts(encoding) {
            Ok(MatchOutcome::Matched(encoding))
        } else {
            Ok(MatchOutcome::EncodingNotAccepted(encoding))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restbind_core::{HandlerSignature, ParameterDecl, Verb};

    fn descriptor(signature: HandlerSignature) -> OperationDescriptor {
        OperationDescriptor::from_signature(
            signature
                .param(ParameterDecl::identity())
                .param(ParameterDecl::patch_type())
                .param(ParameterDecl::body()),
        )
        .unwrap()
    }

    fn patient() -> OperationDescriptor {
        descriptor(HandlerSignature::patch("patch_patient").resource_type("Patient"))
    }

    fn request(verb: Verb, target: &str, content_type: Option<&str>) -> InboundRequest {
        let request = InboundRequest::parse(verb, target, http::HeaderMap::new(), "[]").unwrap();
        match content_type {
            Some(content_type) => request.with_content_type(content_type).unwrap(),
            None => request,
        }
    }

    #[test]
    fn test_matches_instance_and_history_paths() {
        let matcher = PatchMatcher;
        for target in ["/Patient/123", "Patient/123/_history/4"] {
            let outcome = matcher
                .match_request(&patient(), &request(Verb::Patch, target, Some("application/json-patch+json")))
                .unwrap();
            assert_eq!(outcome, MatchOutcome::Matched(PatchEncoding::JsonPatch), "{target}");
        }
    }

    #[test]
    fn test_path_mismatches() {
        let matcher = PatchMatcher;
        for target in ["/Observation/1", "/Patient", "/Patient/1/$meta", "/", "/Patient/1/_history"] {
            let outcome = matcher
                .match_request(&patient(), &request(Verb::Patch, target, Some("application/json-patch+json")))
                .unwrap();
            assert_eq!(outcome, MatchOutcome::NoMatch(Mismatch::Path), "{target}");
        }
    }

    #[test]
    fn test_verb_mismatch_is_exact() {
        let outcome = PatchMatcher
            .match_request(&patient(), &request(Verb::Put, "/Patient/1", Some("application/json-patch+json")))
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch(Mismatch::Verb));
    }

    #[test]
    fn test_from_path_binding_accepts_any_valid_type() {
        let any = descriptor(HandlerSignature::patch("patch_any"));
        let outcome = PatchMatcher
            .match_request(&any, &request(Verb::Patch, "/Observation/1", Some("application/merge-patch+json")))
            .unwrap();
        assert_eq!(outcome, MatchOutcome::Matched(PatchEncoding::JsonMergePatch));

        let outcome = PatchMatcher
            .match_request(&any, &request(Verb::Patch, "/observation/1", Some("application/merge-patch+json")))
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch(Mismatch::Path));
    }

    #[test]
    fn test_unsupported_content_type_is_error() {
        for content_type in [Some("text/plain"), None] {
            let result = PatchMatcher.match_request(&patient(), &request(Verb::Patch, "/Patient/1", content_type));
            match result {
                Err(Error::UnsupportedContentType { found, supported }) => {
                    assert_eq!(found.as_deref(), content_type);
                    assert_eq!(supported.len(), PatchEncoding::ALL.len());
                }
                other => panic!("Expected UnsupportedContentType, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_encoding_not_accepted() {
        let json_only = descriptor(
            HandlerSignature::patch("patch_patient")
                .resource_type("Patient")
                .accept([PatchEncoding::JsonPatch]),
        );
        let outcome = PatchMatcher
            .match_request(&json_only, &request(Verb::Patch, "/Patient/1", Some("application/xml-patch+xml")))
            .unwrap();
        assert_eq!(outcome, MatchOutcome::EncodingNotAccepted(PatchEncoding::XmlPatch));
        assert!(!outcome.is_match());
    }

    proptest::proptest! {
        #[test]
        fn prop_any_valid_id_matches(
            id in "[A-Za-z0-9.-]{1,64}",
            version in proptest::option::of("[A-Za-z0-9.-]{1,16}"),
        ) {
            let target = match &version {
                Some(version) => format!("Patient/{id}/_history/{version}"),
                None => format!("Patient/{id}"),
            };
            let request = InboundRequest::new(Verb::Patch, target.split('/'))
                .with_content_type("application/merge-patch+json")
                .unwrap();
            let outcome = PatchMatcher.match_request(&patient(), &request).unwrap();
            proptest::prop_assert_eq!(outcome, MatchOutcome::Matched(PatchEncoding::JsonMergePatch));
        }
    }
}
