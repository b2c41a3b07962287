//! Dispatcher builder
//!
//! Registration happens here, once, at startup. `build()` turns every
//! handler's signature into an [`OperationDescriptor`] and refuses to produce
//! a dispatcher if any signature is malformed or two operations could claim
//! the same request.
//!
//! # Examples
//!
//! ```rust
//! use restbind_core::{HandlerSignature, ParameterDecl};
//! use restbind_server::{from_patch_fn, Dispatcher, HandlerOutcome, LoggingMiddleware};
//!
//! # fn example() -> restbind_core::Result<()> {
//! let dispatcher = Dispatcher::builder()
//!     .operation(from_patch_fn(
//!         HandlerSignature::patch("patch_patient")
//!             .resource_type("Patient")
//!             .param(ParameterDecl::identity())
//!             .param(ParameterDecl::patch_type())
//!             .param(ParameterDecl::body()),
//!         |call| async move { Ok(Some(HandlerOutcome::new().with_id(call.identity))) },
//!     ))
//!     .use_sync_middleware(LoggingMiddleware)
//!     .max_body_bytes(1 << 20)
//!     .build()?;
//! assert_eq!(dispatcher.operations().len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::dispatcher::{Dispatcher, DispatcherConfig, OperationStrategy, RegisteredOperation};
use crate::handler::OperationHandler;
use crate::metrics::ServerMetrics;
use crate::middleware::{Middleware, MiddlewareChain, SyncMiddleware};
use restbind_core::{Error, ObservabilityConfig, OperationDescriptor, Result};
use std::sync::Arc;

/// Builder for a [`Dispatcher`]
pub struct DispatcherBuilder {
    handlers: Vec<Box<dyn OperationHandler>>,
    middleware_chain: MiddlewareChain,
    config: DispatcherConfig,
    metrics: Option<Arc<ServerMetrics>>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            middleware_chain: MiddlewareChain::new(),
            config: DispatcherConfig::default(),
            metrics: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Register an operation handler
    pub fn operation(mut self, handler: Box<dyn OperationHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register several operation handlers
    pub fn operations(mut self, handlers: impl IntoIterator<Item = Box<dyn OperationHandler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware_chain.add(middleware);
        self
    }

    pub fn use_sync_middleware<T: SyncMiddleware + 'static>(mut self, middleware: T) -> Self {
        self.middleware_chain.add_sync(middleware);
        self
    }

    /// `Content-Type` for successful response bodies (default `application/fhir+json`)
    pub fn response_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.config.response_content_type = content_type.into();
        self
    }

    /// Reject request bodies larger than `limit` bytes
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.config.max_body_bytes = Some(limit);
        self
    }

    /// Record metrics into existing instruments
    pub fn with_metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Initialise OpenTelemetry during `build()` and record metrics through it
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Service name used when observability is enabled
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Validate every registration and build the dispatcher
    ///
    /// Fails with the first [`Error::Configuration`] or
    /// [`Error::AmbiguousBinding`] found; no dispatcher is produced then.
    pub fn build(self) -> Result<Dispatcher> {
        let mut operations: Vec<RegisteredOperation> = Vec::with_capacity(self.handlers.len());

        for handler in self.handlers {
            let descriptor = OperationDescriptor::from_signature(handler.signature()).map_err(|e| {
                tracing::error!(error = %e, "operation registration failed");
                e
            })?;

            if let Some(existing) = operations
                .iter()
                .find(|operation| operation.descriptor().overlaps(&descriptor))
            {
                let error = Error::AmbiguousBinding {
                    first: existing.descriptor().name().to_string(),
                    second: descriptor.name().to_string(),
                };
                tracing::error!(error = %error, "operation registration failed");
                return Err(error);
            }

            tracing::debug!(
                operation = %descriptor.name(),
                verb = %descriptor.verb(),
                path = %descriptor.path_template(),
                "registered operation"
            );
            let strategy = OperationStrategy::for_kind(descriptor.kind());
            operations.push(RegisteredOperation::new(descriptor, Arc::from(handler), strategy));
        }

        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }
                restbind_core::init_observability(config.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {e}"))
                })?;
                Some(Arc::new(ServerMetrics::new(config.service_name)))
            }
            None => self.metrics,
        };

        if let Some(metrics) = &metrics {
            metrics.record_registered(operations.len());
        }

        Ok(Dispatcher::from_parts(
            operations,
            self.middleware_chain,
            self.config,
            metrics,
        ))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::from_fn;
    use restbind_core::{HandlerSignature, ParameterDecl, PatchEncoding};

    fn handler(signature: HandlerSignature) -> Box<dyn OperationHandler> {
        from_fn(signature, |_| async { Ok(None) })
    }

    fn complete(signature: HandlerSignature) -> HandlerSignature {
        signature
            .param(ParameterDecl::identity())
            .param(ParameterDecl::patch_type())
            .param(ParameterDecl::body())
    }

    #[test]
    fn test_build_empty() {
        let dispatcher = DispatcherBuilder::new().build().unwrap();
        assert!(dispatcher.operations().is_empty());
    }

    #[test]
    fn test_build_rejects_missing_patch_type() {
        let signature = HandlerSignature::patch("broken")
            .param(ParameterDecl::identity())
            .param(ParameterDecl::body());

        match DispatcherBuilder::new().operation(handler(signature)).build() {
            Err(Error::Configuration { handler, reason }) => {
                assert_eq!(handler, "broken");
                assert!(reason.contains("PatchType"));
            }
            other => panic!("Expected Configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_build_rejects_overlap() {
        let result = DispatcherBuilder::new()
            .operation(handler(complete(HandlerSignature::patch("a").resource_type("Patient"))))
            .operation(handler(complete(HandlerSignature::patch("b").resource_type("Patient"))))
            .build();

        match result {
            Err(Error::AmbiguousBinding { first, second }) => {
                assert_eq!((first.as_str(), second.as_str()), ("a", "b"));
            }
            other => panic!("Expected AmbiguousBinding, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_from_path_overlaps_fixed_type() {
        let result = DispatcherBuilder::new()
            .operation(handler(complete(HandlerSignature::patch("patient").resource_type("Patient"))))
            .operation(handler(complete(HandlerSignature::patch("any"))))
            .build();
        assert!(matches!(result, Err(Error::AmbiguousBinding { .. })));
    }

    #[test]
    fn test_disjoint_encodings_do_not_overlap() {
        let dispatcher = DispatcherBuilder::new()
            .operation(handler(complete(
                HandlerSignature::patch("json").resource_type("Patient").accept([PatchEncoding::JsonPatch]),
            )))
            .operation(handler(complete(
                HandlerSignature::patch("merge")
                    .resource_type("Patient")
                    .accept([PatchEncoding::JsonMergePatch]),
            )))
            .build()
            .unwrap();

        assert_eq!(dispatcher.operations().len(), 2);
        assert_eq!(dispatcher.operations()[1].descriptor().name(), "merge");
    }

    #[test]
    fn test_config_options() {
        let dispatcher = DispatcherBuilder::new()
            .response_content_type("application/json")
            .max_body_bytes(64)
            .with_metrics(Arc::new(ServerMetrics::new("builder-test")))
            .build()
            .unwrap();

        assert_eq!(dispatcher.config().response_content_type, "application/json");
        assert_eq!(dispatcher.config().max_body_bytes, Some(64));
    }
}
