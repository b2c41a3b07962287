//! PATCH round trip: a client builds the request, an in-process transport
//! hands it to the dispatcher, and the response comes back as a MethodOutcome

use async_trait::async_trait;
use restbind::client::{RestClient, Transport, TransportResponse};
use restbind::core::{
    OutboundInvocation, PatchEncoding, ResourceIdentity, Result,
};
use restbind::patch_operation;
use restbind::server::{Dispatcher, HandlerOutcome, LoggingMiddleware, MetricsMiddleware};
use serde_json::{json, Value};
use std::sync::Arc;

/// Applies a JSON merge patch to a stored patient
#[patch_operation(crate = "restbind::server", resource = "Patient")]
async fn patch_patient(
    id: ResourceIdentity,
    encoding: PatchEncoding,
    #[body] body: String,
    #[query("_pretty")] pretty: Option<bool>,
) -> Result<Option<HandlerOutcome>> {
    let mut patient = json!({"resourceType": "Patient", "id": id.id(), "active": true});

    if encoding == PatchEncoding::JsonMergePatch {
        let patch: Value = serde_json::from_str(&body)?;
        if let (Value::Object(target), Value::Object(fields)) = (&mut patient, patch) {
            target.extend(fields);
        }
    }
    tracing::info!(identity = %id, %encoding, pretty = pretty.unwrap_or(false), "patched");

    Ok(Some(
        HandlerOutcome::new()
            .with_id(id.with_version("2"))
            .with_resource(patient),
    ))
}

struct InProcess(Dispatcher);

#[async_trait]
impl Transport for InProcess {
    async fn send(&self, invocation: OutboundInvocation) -> Result<TransportResponse> {
        println!("-> {} {}", invocation.verb(), invocation.target());
        let response = self.0.handle(&invocation.to_inbound()?).await;
        println!("<- {}", response.status);
        Ok(TransportResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics = Arc::new(MetricsMiddleware::new());
    let dispatcher = Dispatcher::builder()
        .use_sync_middleware(LoggingMiddleware)
        .use_middleware(metrics.clone())
        .operation(patch_patient())
        .build()?;

    let client = RestClient::builder(InProcess(dispatcher)).build()?;

    let outcome = client
        .patch(
            &ResourceIdentity::new("Patient", "123"),
            PatchEncoding::JsonMergePatch,
            r#"{"active":false}"#,
        )
        .await?;
    println!("id: {:?}", outcome.id.map(|id| id.to_string()));
    println!("resource: {}", outcome.resource.unwrap_or_default());

    // Observation is not served, so the server answers 404
    match client
        .patch(
            &ResourceIdentity::new("Observation", "1"),
            PatchEncoding::JsonPatch,
            "[]",
        )
        .await
    {
        Ok(outcome) => println!("unexpected success: {}", outcome.status),
        Err(e) => println!("rejected: {e}"),
    }

    println!(
        "requests: {}, errors: {}",
        metrics.request_count(),
        metrics.error_count()
    );
    Ok(())
}
