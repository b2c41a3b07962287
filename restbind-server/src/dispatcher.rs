//! Operation dispatch
//!
//! The [`Dispatcher`] owns the registry built by
//! [`DispatcherBuilder`](crate::DispatcherBuilder) and routes each request to
//! the single operation that matches it.
//!
//! # Request Flow
//!
//! 1. **Admit**: reject bodies over the configured size limit
//! 2. **Select**: run every operation's matcher; exactly one must match
//! 3. **Bind**: the selected operation's binder builds its [`CallArguments`]
//! 4. **Invoke**: the middleware chain runs around the handler
//! 5. **Respond**: [`Dispatcher::handle`] turns the outcome or the error into
//!    a [`ServerResponse`]
//!
//! # Thread Safety
//!
//! The registry is immutable after `build()` and shared behind an `Arc`, so a
//! `Dispatcher` clones cheaply and serves concurrent requests without locks.
//!
//! [`CallArguments`]: restbind_core::CallArguments

use crate::binder::{ArgumentBinder, PatchBinder};
use crate::builder::DispatcherBuilder;
use crate::handler::OperationHandler;
use crate::matcher::{MatchOutcome, Mismatch, PatchMatcher, RequestMatcher};
use crate::metrics::{ServerMetrics, UNMATCHED};
use crate::middleware::{MiddlewareChain, MiddlewareContext};
use crate::response::{HandlerOutcome, ServerResponse, FHIR_JSON};
use restbind_core::{
    ArgValue, Error, ErrorCategory, InboundRequest, OperationDescriptor, OperationKind,
    PatchEncoding, Result, Verb,
};
use std::sync::Arc;
use std::time::Instant;

/// Matcher and binder pair used for one kind of operation
#[derive(Clone)]
pub struct OperationStrategy {
    pub matcher: Arc<dyn RequestMatcher>,
    pub binder: Arc<dyn ArgumentBinder>,
}

impl OperationStrategy {
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Patch => Self {
                matcher: Arc::new(PatchMatcher),
                binder: Arc::new(PatchBinder),
            },
        }
    }
}

/// One entry of the registry
#[derive(Clone)]
pub struct RegisteredOperation {
    descriptor: OperationDescriptor,
    handler: Arc<dyn OperationHandler>,
    strategy: OperationStrategy,
}

impl RegisteredOperation {
    pub fn new(
        descriptor: OperationDescriptor,
        handler: Arc<dyn OperationHandler>,
        strategy: OperationStrategy,
    ) -> Self {
        Self {
            descriptor,
            handler,
            strategy,
        }
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn strategy(&self) -> &OperationStrategy {
        &self.strategy
    }
}

/// Response and limit settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// `Content-Type` of successful response bodies
    pub response_content_type: String,
    /// Largest accepted request body in bytes; `None` is unlimited
    pub max_body_bytes: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            response_content_type: FHIR_JSON.to_string(),
            max_body_bytes: None,
        }
    }
}

/// Routes requests to registered operations
#[derive(Clone)]
pub struct Dispatcher {
    operations: Arc<Vec<RegisteredOperation>>,
    middleware_chain: MiddlewareChain,
    config: Arc<DispatcherConfig>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Assemble a dispatcher without the overlap check done by the builder
    pub(crate) fn from_parts(
        operations: Vec<RegisteredOperation>,
        middleware_chain: MiddlewareChain,
        config: DispatcherConfig,
        metrics: Option<Arc<ServerMetrics>>,
    ) -> Self {
        Self {
            operations: Arc::new(operations),
            middleware_chain,
            config: Arc::new(config),
            metrics,
        }
    }

    /// Registered operations in registration order
    pub fn operations(&self) -> &[RegisteredOperation] {
        &self.operations
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Find the single operation that serves `request`
    ///
    /// With no match the error explains the nearest miss: a rejected
    /// content type, then a wrong verb, then an unknown path.
    pub fn select(&self, request: &InboundRequest) -> Result<&RegisteredOperation> {
        let mut matched = Vec::new();
        let mut served_other_encoding = Vec::new();
        let mut allowed: Vec<Verb> = Vec::new();

        for operation in self.operations.iter() {
            let outcome = operation
                .strategy
                .matcher
                .match_request(&operation.descriptor, request);

            match outcome {
                Ok(MatchOutcome::Matched(_)) => matched.push(operation),
                Ok(MatchOutcome::EncodingNotAccepted(_)) | Err(Error::UnsupportedContentType { .. }) => {
                    served_other_encoding.push(operation)
                }
                Ok(MatchOutcome::NoMatch(Mismatch::Verb)) => {
                    let verb = operation.descriptor.verb();
                    if !allowed.contains(&verb) {
                        allowed.push(verb);
                    }
                }
                Ok(MatchOutcome::NoMatch(Mismatch::Path)) => {}
                Err(e) => return Err(e),
            }
        }

        match matched.as_slice() {
            [operation] => Ok(*operation),
            [first, second, ..] => Err(Error::AmbiguousBinding {
                first: first.descriptor.name().to_string(),
                second: second.descriptor.name().to_string(),
            }),
            [] if !served_other_encoding.is_empty() => {
                let supported: Vec<PatchEncoding> = PatchEncoding::ALL
                    .into_iter()
                    .filter(|encoding| {
                        served_other_encoding
                            .iter()
                            .any(|operation| operation.descriptor.accepts(*encoding))
                    })
                    .collect();
                Err(Error::unsupported_content_type(
                    request.content_type().as_deref(),
                    &supported,
                ))
            }
            [] if !allowed.is_empty() => {
                allowed.sort();
                Err(Error::MethodNotAllowed {
                    verb: request.verb.to_string(),
                    path: request.path(),
                    allowed: allowed.iter().map(ToString::to_string).collect(),
                })
            }
            [] => Err(Error::OperationNotFound {
                verb: request.verb.to_string(),
                path: request.path(),
            }),
        }
    }

    /// Select, bind and invoke
    ///
    /// Errors are logged here; [`handle`](Self::handle) additionally turns
    /// them into responses.
    pub async fn route(&self, request: &InboundRequest) -> Result<Option<HandlerOutcome>> {
        let (operation, result) = self.dispatch(request).await;
        if let Err(e) = &result {
            self.report(operation, request, e);
        }
        result
    }

    /// Route and serialise; never fails
    pub async fn handle(&self, request: &InboundRequest) -> ServerResponse {
        let started = Instant::now();
        let (operation, result) = self.dispatch(request).await;

        let response = result.and_then(|outcome| {
            ServerResponse::from_outcome(outcome.as_ref(), &self.config.response_content_type)
        });
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.report(operation, request, &e);
                ServerResponse::from_error(&e)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_request(
                operation,
                request.verb.as_str(),
                response.status.as_u16(),
                started.elapsed().as_secs_f64(),
            );
        }

        response
    }

    async fn dispatch(&self, request: &InboundRequest) -> (&str, Result<Option<HandlerOutcome>>) {
        if let Some(limit) = self.config.max_body_bytes {
            if request.body.len() > limit {
                let error = Error::PayloadTooLarge {
                    limit,
                    actual: request.body.len(),
                };
                return (UNMATCHED, Err(error));
            }
        }

        match self.select(request) {
            Ok(operation) => (operation.descriptor.name(), self.invoke(operation, request).await),
            Err(e) => (UNMATCHED, Err(e)),
        }
    }

    async fn invoke(
        &self,
        operation: &RegisteredOperation,
        request: &InboundRequest,
    ) -> Result<Option<HandlerOutcome>> {
        let descriptor = &operation.descriptor;
        let args = operation.strategy.binder.bind(descriptor, request)?;

        let handler = Arc::clone(&operation.handler);
        let outcome = if self.middleware_chain.is_empty() {
            handler.invoke(args).await?
        } else {
            let mut ctx = MiddlewareContext::new(descriptor.name(), request.verb, request.path());
            if let Some(ArgValue::Identity(identity)) = args.get(descriptor.identity_index()) {
                ctx = ctx.with_identity(identity.clone());
            }
            self.middleware_chain
                .execute(ctx, move |_ctx| handler.invoke(args))
                .await?
        };

        if outcome.is_none() && !descriptor.allows_empty_return() {
            return Err(Error::InvariantViolation(format!(
                "operation '{}' returned no outcome",
                descriptor.name()
            )));
        }

        Ok(outcome)
    }

    fn report(&self, operation: &str, request: &InboundRequest, error: &Error) {
        let category = error.category();
        match category {
            ErrorCategory::Client => tracing::debug!(
                operation,
                verb = %request.verb,
                path = %request.path(),
                category = %category,
                error = %error,
                "request rejected"
            ),
            _ => tracing::error!(
                operation,
                verb = %request.verb,
                path = %request.path(),
                category = %category,
                error = %error,
                "request failed"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_error(operation, category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::from_fn;
    use http::HeaderMap;
    use restbind_core::{HandlerSignature, ParameterDecl, ResourceIdentity};

    fn patch_handler(name: &str, resource_type: &str) -> Box<dyn OperationHandler> {
        let signature = HandlerSignature::patch(name)
            .resource_type(resource_type)
            .param(ParameterDecl::identity())
            .param(ParameterDecl::patch_type())
            .param(ParameterDecl::body());

        from_fn(signature, |mut args| async move {
            let identity: ResourceIdentity = args.take_as(0)?;
            Ok(Some(HandlerOutcome::new().with_id(identity)))
        })
    }

    fn registered(handler: Box<dyn OperationHandler>) -> RegisteredOperation {
        let descriptor = OperationDescriptor::from_signature(handler.signature()).unwrap();
        let strategy = OperationStrategy::for_kind(descriptor.kind());
        RegisteredOperation::new(descriptor, Arc::from(handler), strategy)
    }

    fn request(target: &str) -> InboundRequest {
        InboundRequest::parse(Verb::Patch, target, HeaderMap::new(), "[]")
            .unwrap()
            .with_content_type("application/json-patch+json")
            .unwrap()
    }

    #[test]
    fn test_ambiguous_registry_fails_selection() {
        // The builder refuses this registry; from_parts does not check.
        let dispatcher = Dispatcher::from_parts(
            vec![
                registered(patch_handler("first", "Patient")),
                registered(patch_handler("second", "Patient")),
            ],
            MiddlewareChain::new(),
            DispatcherConfig::default(),
            None,
        );

        match dispatcher.select(&request("/Patient/1")) {
            Err(Error::AmbiguousBinding { first, second }) => {
                assert_eq!(first, "first");
                assert_eq!(second, "second");
            }
            other => panic!("Expected AmbiguousBinding, got {:?}", other.map(|op| op.descriptor().name())),
        }
    }

    #[tokio::test]
    async fn test_ambiguity_is_internal_error_response() {
        let dispatcher = Dispatcher::from_parts(
            vec![
                registered(patch_handler("first", "Patient")),
                registered(patch_handler("second", "Patient")),
            ],
            MiddlewareChain::new(),
            DispatcherConfig::default(),
            None,
        );

        let response = dispatcher.handle(&request("/Patient/1")).await;
        assert_eq!(response.status, http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_select_single_match() {
        let dispatcher = Dispatcher::from_parts(
            vec![
                registered(patch_handler("patch_patient", "Patient")),
                registered(patch_handler("patch_observation", "Observation")),
            ],
            MiddlewareChain::new(),
            DispatcherConfig::default(),
            None,
        );

        let selected = dispatcher.select(&request("/Observation/9")).unwrap();
        assert_eq!(selected.descriptor().name(), "patch_observation");
    }

    #[tokio::test]
    async fn test_empty_outcome_rejected_when_not_allowed() {
        let signature = HandlerSignature::patch("strict")
            .resource_type("Patient")
            .param(ParameterDecl::identity())
            .param(ParameterDecl::patch_type())
            .param(ParameterDecl::body())
            .allows_empty_return(false);
        let dispatcher = Dispatcher::from_parts(
            vec![registered(from_fn(signature, |_| async { Ok(None) }))],
            MiddlewareChain::new(),
            DispatcherConfig::default(),
            None,
        );

        let result = dispatcher.route(&request("/Patient/1")).await;
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }
}
