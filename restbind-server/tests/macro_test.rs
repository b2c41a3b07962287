//! `#[patch_operation]` handlers registered and dispatched end to end

use bytes::Bytes;
use http::header::CONTENT_LOCATION;
use pretty_assertions::assert_eq;
use restbind_core::{
    Error, InboundRequest, OperationDescriptor, ParamRole, PatchEncoding, QueryParamType,
    ResourceIdentity, Result, Verb,
};
use restbind_macros::patch_operation;
use restbind_server::{Dispatcher, HandlerOutcome, OperationHandler};
use serde_json::json;

#[patch_operation(resource = "Patient")]
async fn patch_patient(
    id: ResourceIdentity,
    encoding: PatchEncoding,
    #[body] body: Bytes,
) -> Result<Option<HandlerOutcome>> {
    Ok(Some(
        HandlerOutcome::new()
            .with_id(id.with_version("2"))
            .with_resource(json!({
                "encoding": encoding.to_string(),
                "bytes": body.len(),
            })),
    ))
}

/// Serves any resource type and reads query parameters
#[patch_operation]
async fn patch_any(
    #[body] body: String,
    #[query("_count")] count: Option<i64>,
    encoding: PatchEncoding,
    id: ResourceIdentity,
    #[query("tag")] tags: Vec<String>,
) -> Result<Option<HandlerOutcome>> {
    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(HandlerOutcome::new().with_id(id).with_resource(json!({
        "count": count,
        "tags": tags,
        "content_type": encoding.content_type(),
    }))))
}

/// Declares no patch type, so registration must fail
#[patch_operation(resource = "Patient")]
async fn missing_patch_type(
    _id: ResourceIdentity,
    #[body] _body: Bytes,
) -> Result<Option<HandlerOutcome>> {
    Ok(None)
}

#[test]
fn test_signature_follows_parameter_order() {
    let descriptor = OperationDescriptor::from_signature(patch_any().signature()).unwrap();

    assert_eq!(descriptor.name(), "patch_any");
    assert_eq!(descriptor.body_index(), 0);
    assert_eq!(descriptor.patch_type_index(), 2);
    assert_eq!(descriptor.identity_index(), 3);
    assert_eq!(descriptor.resource_binding().resource_type(), None);

    let queries: Vec<_> = descriptor
        .query_slots()
        .map(|(index, spec)| (index, spec.name.clone(), spec.param_type, spec.required))
        .collect();
    assert_eq!(
        queries,
        vec![
            (1, "_count".to_string(), QueryParamType::Integer, false),
            (4, "tag".to_string(), QueryParamType::TextList, false),
        ]
    );
}

#[test]
fn test_signature_labels_parameters() {
    let signature = patch_patient().signature();
    let labels: Vec<_> = signature.params.iter().map(|p| p.label.clone()).collect();
    assert_eq!(
        labels,
        vec![Some("id".to_string()), Some("encoding".to_string()), Some("body".to_string())]
    );
    assert_eq!(signature.params[2].role, ParamRole::Body);
    assert_eq!(signature.resource_binding.resource_type(), Some("Patient"));
}

#[test]
fn test_missing_role_fails_at_build() {
    let error = Dispatcher::builder()
        .operation(missing_patch_type())
        .build()
        .err()
        .expect("build should fail");

    match error {
        Error::Configuration { handler, reason } => {
            assert_eq!(handler, "missing_patch_type");
            assert!(reason.contains("PatchType"));
        }
        other => panic!("Expected configuration error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generated_handler_dispatches() {
    let dispatcher = Dispatcher::builder()
        .operation(patch_patient())
        .build()
        .unwrap();

    let request = InboundRequest::new(Verb::Patch, ["Patient", "123"])
        .with_content_type("application/merge-patch+json")
        .unwrap()
        .with_body(r#"{"active":false}"#);
    let response = dispatcher.handle(&request).await;

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.header(CONTENT_LOCATION), Some("Patient/123/_history/2"));
    assert_eq!(
        response.json().unwrap(),
        json!({"encoding": PatchEncoding::JsonMergePatch.to_string(), "bytes": 16})
    );
}

#[tokio::test]
async fn test_generated_handler_reads_query() {
    let dispatcher = Dispatcher::builder().operation(patch_any()).build().unwrap();

    let request = InboundRequest::parse(
        Verb::Patch,
        "Observation/9?_count=5&tag=a&tag=b",
        http::HeaderMap::new(),
        "[]",
    )
    .unwrap()
    .with_content_type("application/json-patch+json")
    .unwrap();
    let response = dispatcher.handle(&request).await;

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(
        response.json().unwrap(),
        json!({"count": 5, "tags": ["a", "b"], "content_type": "application/json-patch+json"})
    );

    let empty = InboundRequest::new(Verb::Patch, ["Observation", "9"])
        .with_content_type("application/json-patch+json")
        .unwrap();
    assert_eq!(dispatcher.handle(&empty).await.status.as_u16(), 204);
}
