//! REST client facade
//!
//! [`RestClient`] builds an invocation for an operation, hands it to a
//! [`Transport`] and interprets what comes back. The transport is the only
//! part that touches the network, so tests and in-process setups plug in
//! their own.
//!
//! # Response Handling
//!
//! - **2xx**: a [`MethodOutcome`] with the identity taken from
//!   `Content-Location` (or `Location`) and the body parsed as JSON when the
//!   response declares a JSON content type
//! - **anything else**: [`Error::Remote`] carrying the decoded
//!   `OperationOutcome`, or a synthesized one when the body is not one
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use restbind_client::{RestClient, Transport, TransportResponse};
//! use restbind_core::{OutboundInvocation, PatchEncoding, ResourceIdentity, Result, StatusCode};
//!
//! struct NoContent;
//!
//! #[async_trait]
//! impl Transport for NoContent {
//!     async fn send(&self, _invocation: OutboundInvocation) -> Result<TransportResponse> {
//!         Ok(TransportResponse::new(StatusCode::NO_CONTENT))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let client = RestClient::builder(NoContent).build()?;
//! let outcome = client
//!     .patch(&ResourceIdentity::new("Patient", "1"), PatchEncoding::JsonPatch, "[]")
//!     .await?;
//! assert!(outcome.resource.is_none());
//! # Ok(())
//! # }
//! ```

use crate::invocation::{ClientInvocationBuilder, InvocationBuilder};
use crate::metrics::ClientMetrics;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AsHeaderName, CONTENT_LOCATION, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use restbind_core::types::HISTORY_SEGMENT;
use restbind_core::{
    CallArguments, Error, ErrorOutcome, IssueSeverity, ObservabilityConfig, OperationDescriptor,
    OutboundInvocation, PatchEncoding, ResourceIdentity, Result,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Sends an invocation and returns the raw response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, invocation: OutboundInvocation) -> Result<TransportResponse>;
}

/// Raw response as received by a [`Transport`]
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Transport(format!("Invalid header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Successful result of a remote operation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodOutcome {
    pub status: StatusCode,
    /// Identity reported by the server, usually with the new version
    pub id: Option<ResourceIdentity>,
    /// Response body when it was JSON
    pub resource: Option<Value>,
}

/// Client for invoking restbind operations through a [`Transport`]
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn Transport>,
    invocations: Arc<dyn InvocationBuilder>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl RestClient {
    pub fn builder<T: Transport + 'static>(transport: T) -> RestClientBuilder {
        RestClientBuilder::new(Arc::new(transport))
    }

    /// Build, send and interpret an invocation of `descriptor`
    pub async fn invoke(&self, descriptor: &OperationDescriptor, args: &CallArguments) -> Result<MethodOutcome> {
        let invocation = self.invocations.build(descriptor, args);
        self.round_trip(descriptor.name(), invocation).await
    }

    /// PATCH a typed identity without a descriptor
    pub async fn patch(
        &self,
        identity: &ResourceIdentity,
        encoding: PatchEncoding,
        body: impl Into<Bytes>,
    ) -> Result<MethodOutcome> {
        let invocation = ClientInvocationBuilder::patch(identity, encoding, body);
        self.round_trip("patch", invocation).await
    }

    async fn round_trip(&self, operation: &str, invocation: Result<OutboundInvocation>) -> Result<MethodOutcome> {
        let started = Instant::now();
        let result = match invocation {
            Ok(invocation) => {
                tracing::debug!(
                    operation,
                    verb = %invocation.verb(),
                    target = %invocation.target(),
                    "sending invocation"
                );
                self.transport.send(invocation).await
            }
            Err(e) => Err(e),
        };

        let outcome = result.and_then(|response| {
            if let Some(metrics) = &self.metrics {
                metrics.record_invocation(operation, response.status.as_u16(), started.elapsed().as_secs_f64());
            }
            interpret(response)
        });

        if let Err(e) = &outcome {
            tracing::warn!(operation, category = %e.category(), error = %e, "invocation failed");
            if let Some(metrics) = &self.metrics {
                metrics.record_error(operation, e.category());
            }
        }
        outcome
    }
}

/// Builder for a [`RestClient`]
pub struct RestClientBuilder {
    transport: Arc<dyn Transport>,
    invocations: Arc<dyn InvocationBuilder>,
    metrics: Option<Arc<ClientMetrics>>,
    default_metrics: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl RestClientBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            invocations: Arc::new(ClientInvocationBuilder),
            metrics: None,
            default_metrics: false,
            observability_config: None,
            service_name: None,
        }
    }

    /// Replace the invocation builder
    pub fn invocation_builder(mut self, builder: Arc<dyn InvocationBuilder>) -> Self {
        self.invocations = builder;
        self
    }

    /// Record into existing instruments
    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record into instruments named after the service
    pub fn with_default_metrics(mut self) -> Self {
        self.default_metrics = true;
        self
    }

    /// Initialise OpenTelemetry during `build()`
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<RestClient> {
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }
            restbind_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {e}")))?;
            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else if self.metrics.is_some() {
            self.metrics
        } else if self.default_metrics {
            let name = self
                .service_name
                .unwrap_or_else(|| ObservabilityConfig::default().service_name);
            Some(Arc::new(ClientMetrics::new(name)))
        } else {
            None
        };

        Ok(RestClient {
            transport: self.transport,
            invocations: self.invocations,
            metrics,
        })
    }
}

fn interpret(response: TransportResponse) -> Result<MethodOutcome> {
    if !response.status.is_success() {
        return Err(Error::Remote {
            status: response.status.as_u16(),
            outcome: error_outcome(&response),
        });
    }

    let id = response
        .header(CONTENT_LOCATION)
        .or_else(|| response.header(LOCATION))
        .and_then(identity_from_location);

    let is_json = response
        .header(CONTENT_TYPE)
        .map(|content_type| content_type.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);
    let resource = if is_json && !response.body.is_empty() {
        Some(serde_json::from_slice(&response.body)?)
    } else {
        None
    };

    Ok(MethodOutcome {
        status: response.status,
        id,
        resource,
    })
}

fn error_outcome(response: &TransportResponse) -> ErrorOutcome {
    serde_json::from_slice::<ErrorOutcome>(&response.body)
        .ok()
        .filter(|outcome| outcome.resource_type == "OperationOutcome")
        .unwrap_or_else(|| {
            let body = String::from_utf8_lossy(&response.body);
            let diagnostics = if body.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                format!("HTTP {}: {body}", response.status)
            };
            ErrorOutcome::new(IssueSeverity::Error, "exception", diagnostics)
        })
}

/// Identity from a `Location` value, which may be an absolute URL
///
/// Only the trailing `Type/id` or `Type/id/_history/vid` is kept.
pub fn identity_from_location(location: &str) -> Option<ResourceIdentity> {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();

    let tail = match segments.len() {
        len if len >= 4 && segments[len - 2] == HISTORY_SEGMENT => &segments[len - 4..],
        len if len >= 2 => &segments[len - 2..],
        _ => return None,
    };

    ResourceIdentity::parse(&tail.join("/"))
        .ok()
        .filter(ResourceIdentity::has_resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_identity_from_location() {
        let cases = [
            ("Patient/1", Some(ResourceIdentity::new("Patient", "1"))),
            (
                "http://example.org/fhir/Patient/1/_history/3",
                Some(ResourceIdentity::new("Patient", "1").with_version("3")),
            ),
            ("/base/Observation/x.1?_format=json", Some(ResourceIdentity::new("Observation", "x.1"))),
            ("1", None),
            ("http://example.org/fhir/", None),
        ];

        for (location, expected) in cases {
            assert_eq!(identity_from_location(location), expected, "{location}");
        }
    }

    #[test]
    fn test_interpret_success() {
        let response = TransportResponse::new(StatusCode::OK)
            .with_header(CONTENT_LOCATION, "Patient/1/_history/2")
            .unwrap()
            .with_header(CONTENT_TYPE, "application/fhir+json; charset=utf-8")
            .unwrap()
            .with_body(r#"{"resourceType":"Patient","id":"1"}"#);

        let outcome = interpret(response).unwrap();
        assert_eq!(outcome.id.unwrap().version(), Some("2"));
        assert_eq!(outcome.resource.unwrap(), json!({"resourceType": "Patient", "id": "1"}));
    }

    #[test]
    fn test_interpret_location_fallback_and_no_body() {
        let response = TransportResponse::new(StatusCode::NO_CONTENT)
            .with_header(LOCATION, "http://h/fhir/Patient/5")
            .unwrap();

        let outcome = interpret(response).unwrap();
        assert_eq!(outcome.status, StatusCode::NO_CONTENT);
        assert_eq!(outcome.id, Some(ResourceIdentity::new("Patient", "5")));
        assert!(outcome.resource.is_none());
    }

    #[test]
    fn test_interpret_operation_outcome_error() {
        let body = json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "code": "invalid", "diagnostics": "bad patch"}]
        });
        let response = TransportResponse::new(StatusCode::BAD_REQUEST).with_body(body.to_string());

        match interpret(response) {
            Err(Error::Remote { status, outcome }) => {
                assert_eq!(status, 400);
                assert_eq!(outcome.diagnostics(), Some("bad patch"));
            }
            other => panic!("Expected Remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_plain_error_body() {
        let response = TransportResponse::new(StatusCode::BAD_GATEWAY).with_body("upstream down");

        match interpret(response) {
            Err(error @ Error::Remote { .. }) => {
                assert!(error.to_string().contains("upstream down"));
                assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
            }
            other => panic!("Expected Remote error, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_invalid_json_body() {
        let response = TransportResponse::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, "application/json")
            .unwrap()
            .with_body("{not json");
        assert!(matches!(interpret(response), Err(Error::Serialization(_))));
    }
}
