//! Argument binding
//!
//! Once a request has matched, the binder builds the handler's
//! [`CallArguments`], one slot per declared parameter. Binding is
//! all-or-nothing: the first failing slot aborts it and nothing partial is
//! returned.

use restbind_core::codec::{classify_path, PathShape};
use restbind_core::types::is_valid_id;
use restbind_core::{
    ArgValue, CallArguments, Error, InboundRequest, OperationDescriptor, ParamRole, PatchEncoding,
    QueryParamSpec, ResourceIdentity, Result,
};

/// Extracts typed arguments from a matched request
pub trait ArgumentBinder: Send + Sync {
    fn bind(&self, descriptor: &OperationDescriptor, request: &InboundRequest) -> Result<CallArguments>;
}

/// Binder for instance-level PATCH operations
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchBinder;

impl ArgumentBinder for PatchBinder {
    fn bind(&self, descriptor: &OperationDescriptor, request: &InboundRequest) -> Result<CallArguments> {
        descriptor
            .roles()
            .iter()
            .map(|role| match role {
                ParamRole::ResourceIdentity => bind_identity(descriptor, request).map(ArgValue::Identity),
                ParamRole::PatchType => bind_patch_type(descriptor, request).map(ArgValue::PatchType),
                ParamRole::Body => Ok(ArgValue::Body(request.body.clone())),
                ParamRole::Query(spec) => bind_query(spec, request),
                ParamRole::Unused => Ok(ArgValue::Unset),
            })
            .collect::<Result<Vec<_>>>()
            .map(CallArguments::from)
    }
}

/// Identity from the request path, with the operation's type rule applied
pub fn bind_identity(descriptor: &OperationDescriptor, request: &InboundRequest) -> Result<ResourceIdentity> {
    let (resource_type, id, version) = match classify_path(&request.path_segments) {
        PathShape::Instance {
            resource_type,
            id,
            version,
        } => (resource_type, id, version),
        _ => {
            return Err(Error::InvariantViolation(format!(
                "no resource id in path {} for operation '{}'",
                request.path(),
                descriptor.name()
            )))
        }
    };

    if !is_valid_id(id) {
        return Err(Error::InvalidRequest(format!("Invalid resource id: '{id}'")));
    }

    let mut identity = ResourceIdentity::new(resource_type, id);
    if let Some(version) = version {
        if !is_valid_id(version) {
            return Err(Error::InvalidRequest(format!("Invalid version id: '{version}'")));
        }
        identity = identity.with_version(version);
    }

    descriptor.resolve_identity(&identity)
}

/// Patch encoding from `Content-Type`, restricted to the accepted set
pub fn bind_patch_type(descriptor: &OperationDescriptor, request: &InboundRequest) -> Result<PatchEncoding> {
    let content_type = request.content_type();
    let unsupported =
        || Error::unsupported_content_type(content_type.as_deref(), descriptor.accepted_encodings());

    let encoding = PatchEncoding::from_content_type(content_type.as_deref()).map_err(|_| unsupported())?;
    if descriptor.accepts(encoding) {
        Ok(encoding)
    } else {
        Err(unsupported())
    }
}

fn bind_query(spec: &QueryParamSpec, request: &InboundRequest) -> Result<ArgValue> {
    let values = request.query_values(&spec.name);
    if values.is_empty() {
        return if spec.required {
            Err(Error::MissingQueryParameter {
                name: spec.name.clone(),
            })
        } else {
            Ok(ArgValue::Unset)
        };
    }

    spec.param_type.convert(&spec.name, &values).map(ArgValue::Query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use restbind_core::{HandlerSignature, ParameterDecl, QueryParamType, QueryValue, Verb};

    const JSON_PATCH_BODY: &str = r#"[{"op":"replace","path":"/active","value":false}]"#;

    fn patient() -> OperationDescriptor {
        OperationDescriptor::from_signature(
            HandlerSignature::patch("patch_patient")
                .resource_type("Patient")
                .param(ParameterDecl::identity())
                .param(ParameterDecl::patch_type())
                .param(ParameterDecl::body()),
        )
        .unwrap()
    }

    fn request(target: &str, content_type: &str) -> InboundRequest {
        InboundRequest::parse(Verb::Patch, target, http::HeaderMap::new(), JSON_PATCH_BODY)
            .unwrap()
            .with_content_type(content_type)
            .unwrap()
    }

    #[test]
    fn test_bind_json_patch() {
        let args = PatchBinder
            .bind(&patient(), &request("/Patient/123", "application/json-patch+json"))
            .unwrap();

        assert_eq!(
            args.into_vec(),
            vec![
                ArgValue::Identity(ResourceIdentity::new("Patient", "123")),
                ArgValue::PatchType(PatchEncoding::JsonPatch),
                ArgValue::Body(Bytes::from_static(JSON_PATCH_BODY.as_bytes())),
            ]
        );
    }

    #[test]
    fn test_bind_keeps_version() {
        let mut args = PatchBinder
            .bind(&patient(), &request("/Patient/123/_history/9", "application/json-patch+json"))
            .unwrap();
        let identity: ResourceIdentity = args.take_as(0).unwrap();
        assert_eq!(identity.version(), Some("9"));
    }

    #[test]
    fn test_bind_rejects_text_plain() {
        match PatchBinder.bind(&patient(), &request("/Patient/123", "text/plain")) {
            Err(error @ Error::UnsupportedContentType { .. }) => {
                assert!(error.to_string().contains("text/plain"));
            }
            other => panic!("Expected UnsupportedContentType, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_type_mismatch_names_both_types() {
        match PatchBinder.bind(&patient(), &request("/Observation/123", "application/json-patch+json")) {
            Err(Error::ResourceTypeMismatch { expected, found }) => {
                assert_eq!(expected, "Patient");
                assert_eq!(found, "Observation");
            }
            other => panic!("Expected ResourceTypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_without_id_is_invariant_violation() {
        let result = PatchBinder.bind(&patient(), &request("/Patient", "application/json-patch+json"));
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_bind_invalid_id() {
        let result = PatchBinder.bind(&patient(), &request("/Patient/a%20b", "application/json-patch+json"));
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_bind_query_slots() {
        let descriptor = OperationDescriptor::from_signature(
            HandlerSignature::patch("patch_patient")
                .resource_type("Patient")
                .param(ParameterDecl::identity())
                .param(ParameterDecl::patch_type())
                .param(ParameterDecl::body())
                .param(ParameterDecl::query("_count", QueryParamType::Integer))
                .param(ParameterDecl::optional_query("_format", QueryParamType::Text))
                .param(ParameterDecl::optional_query("tag", QueryParamType::TextList))
                .param(ParameterDecl::unused()),
        )
        .unwrap();

        let args = PatchBinder
            .bind(
                &descriptor,
                &request("/Patient/1?tag=a&_count=3&tag=b", "application/json-patch+json"),
            )
            .unwrap();

        assert_eq!(args.get(3), Some(&ArgValue::Query(QueryValue::Integer(3))));
        assert_eq!(args.get(4), Some(&ArgValue::Unset));
        assert_eq!(
            args.get(5),
            Some(&ArgValue::Query(QueryValue::TextList(vec!["a".into(), "b".into()])))
        );
        assert_eq!(args.get(6), Some(&ArgValue::Unset));

        let missing = PatchBinder.bind(&descriptor, &request("/Patient/1", "application/json-patch+json"));
        assert!(matches!(missing, Err(Error::MissingQueryParameter { name }) if name == "_count"));

        let invalid = PatchBinder.bind(&descriptor, &request("/Patient/1?_count=x", "application/json-patch+json"));
        assert!(matches!(invalid, Err(Error::InvalidQueryParameter { .. })));
    }
}
