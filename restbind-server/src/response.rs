//! Handler outcomes and their serialised responses
//!
//! A handler resolves to `Option<HandlerOutcome>`. `None` means the handler
//! completed with nothing to report, which PATCH permits. The dispatcher turns
//! the outcome, or the error that replaced it, into a [`ServerResponse`]
//! that a transport can write out verbatim.
//!
//! | Result | Status | Body |
//! |---|---|---|
//! | outcome with resource | 200 | resource JSON |
//! | outcome with operation outcome only | 200 | operation outcome JSON |
//! | outcome with identity only | 200 | empty |
//! | `None` | 204 | empty |
//! | `Err(e)` | `e.status()` | `OperationOutcome` JSON |

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_LOCATION, CONTENT_TYPE, ETAG};
use http::{HeaderMap, HeaderValue, StatusCode};
use restbind_core::{Error, ResourceIdentity, Result};
use serde_json::Value;

/// Content type used for every response body the dispatcher writes itself
pub const FHIR_JSON: &str = "application/fhir+json";

/// What a handler reports back after a successful operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Identity of the affected resource, ideally with its new version
    pub id: Option<ResourceIdentity>,
    /// The updated resource
    pub resource: Option<Value>,
    /// An `OperationOutcome` with informational issues
    pub operation_outcome: Option<Value>,
}

impl HandlerOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: ResourceIdentity) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_operation_outcome(mut self, outcome: Value) -> Self {
        self.operation_outcome = Some(outcome);
        self
    }

    /// True when nothing was set
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.resource.is_none() && self.operation_outcome.is_none()
    }
}

/// Status, headers and body ready to be written by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct ServerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServerResponse {
    /// Response for a successful operation
    ///
    /// `content_type` is only set when there is a body to describe.
    pub fn from_outcome(outcome: Option<&HandlerOutcome>, content_type: &str) -> Result<Self> {
        let outcome = match outcome {
            Some(outcome) => outcome,
            None => return Ok(Self::no_content()),
        };

        let mut headers = HeaderMap::new();
        if let Some(id) = &outcome.id {
            headers.insert(CONTENT_LOCATION, header_value(&id.to_string())?);
            if let Some(version) = id.version() {
                headers.insert(ETAG, header_value(&format!("W/\"{version}\""))?);
            }
        }

        let body = match outcome.resource.as_ref().or(outcome.operation_outcome.as_ref()) {
            Some(value) => {
                headers.insert(CONTENT_TYPE, header_value(content_type)?);
                Bytes::from(serde_json::to_vec(value)?)
            }
            None => Bytes::new(),
        };

        Ok(Self {
            status: StatusCode::OK,
            headers,
            body,
        })
    }

    /// Response for a failed operation; never fails itself
    pub fn from_error(error: &Error) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));

        if let Error::MethodNotAllowed { allowed, .. } = error {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                headers.insert(ALLOW, value);
            }
        }

        // OperationOutcome holds only strings and enums
        let body = serde_json::to_vec(&error.to_outcome())
            .map(Bytes::from)
            .unwrap_or_default();

        Self {
            status: error.status(),
            headers,
            body,
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Internal(format!("Cannot encode header value '{value}': {e}")))
}
