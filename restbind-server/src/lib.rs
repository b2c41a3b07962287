//! Server half of restbind: matching, binding and dispatch
//!
//! This crate turns registered [`OperationHandler`]s into a [`Dispatcher`]
//! that takes an [`InboundRequest`](restbind_core::InboundRequest), picks the
//! one operation that serves it, binds typed arguments and invokes the
//! handler. Sockets and HTTP framing are left to whatever transport sits in
//! front of it.
//!
//! # Core Features
//!
//! - **Registration-time validation**: malformed signatures and overlapping
//!   operations stop `build()` instead of surfacing on the request path
//! - **Deterministic selection**: exactly one operation matches a request or
//!   the request is rejected with a precise 404, 405 or 415
//! - **All-or-nothing binding**: identity, patch encoding, body and query
//!   parameters are bound together or not at all
//! - **Middleware**: interceptors around the handler call
//! - **Observability**: OpenTelemetry metrics and `tracing` events
//!
//! # Quick Start
//!
//! ```rust
//! use restbind_core::{HandlerSignature, InboundRequest, ParameterDecl, Verb};
//! use restbind_server::{from_patch_fn, Dispatcher, HandlerOutcome};
//!
//! # #[tokio::main]
//! # async fn main() -> restbind_core::Result<()> {
//! let dispatcher = Dispatcher::builder()
//!     .operation(from_patch_fn(
//!         HandlerSignature::patch("patch_patient")
//!             .resource_type("Patient")
//!             .param(ParameterDecl::identity())
//!             .param(ParameterDecl::patch_type())
//!             .param(ParameterDecl::body()),
//!         |call| async move { Ok(Some(HandlerOutcome::new().with_id(call.identity))) },
//!     ))
//!     .build()?;
//!
//! let request = InboundRequest::parse(Verb::Patch, "/Patient/123", Default::default(), "[]")?
//!     .with_content_type("application/json-patch+json")?;
//! let response = dispatcher.handle(&request).await;
//! assert_eq!(response.status.as_u16(), 200);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Each [`OperationKind`](restbind_core::OperationKind) has an
//! [`OperationStrategy`]: a [`RequestMatcher`] that decides whether a
//! request belongs to an operation, and an [`ArgumentBinder`] that extracts
//! its arguments. The registry is immutable once built and shared by `Arc`.

mod binder;
mod builder;
mod dispatcher;
mod handler;
mod matcher;
mod metrics;
mod middleware;
mod response;

pub use binder::{bind_identity, bind_patch_type, ArgumentBinder, PatchBinder};
pub use builder::DispatcherBuilder;
pub use dispatcher::{Dispatcher, DispatcherConfig, OperationStrategy, RegisteredOperation};
pub use handler::{from_fn, from_patch_fn, FnHandler, HandlerResult, OperationHandler, PatchCall};
pub use matcher::{MatchOutcome, Mismatch, PatchMatcher, RequestMatcher};
pub use metrics::{ServerMetrics, UNMATCHED};
pub use middleware::{
    LoggingMiddleware, MetricsMiddleware, Middleware, MiddlewareAction, MiddlewareChain,
    MiddlewareContext, OperationResult, SyncMiddleware, TracingMiddleware,
};
pub use response::{HandlerOutcome, ServerResponse, FHIR_JSON};

/// Paths used by `#[patch_operation]` expansions
#[doc(hidden)]
pub mod __private {
    pub use restbind_core::{
        CallArguments, HandlerSignature, ParamRole, ParameterDecl, QueryArgument, QueryParamSpec,
    };
}
