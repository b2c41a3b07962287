//! Core types for restbind, the REST operation binding layer
//!
//! This crate holds everything the server and client halves share:
//!
//! - **Types**: [`Verb`], [`ResourceIdentity`], [`PatchEncoding`], and the
//!   [`InboundRequest`] / [`OutboundInvocation`] request views
//! - **Arguments**: positional [`CallArguments`] and typed extraction
//! - **Descriptors**: [`HandlerSignature`] validation into an immutable
//!   [`OperationDescriptor`]
//! - **Codec**: request-target splitting, query encoding, content-type lookup
//! - **Error handling**: [`Error`] and its wire form [`ErrorOutcome`]
//! - **Observability**: OpenTelemetry and `tracing` setup
//!
//! # Overview
//!
//! A REST server receives requests like
//! `PATCH /Patient/123` with a JSON Patch body and must decide which handler
//! serves it and with which arguments. The binding layer answers that from
//! a declared [`HandlerSignature`]: the signature is validated once at
//! startup, and every request is then matched and bound against the
//! resulting descriptor. The client half uses the same descriptor to build
//! the equivalent outbound request.
//!
//! # Example
//!
//! ```rust
//! use restbind_core::{HandlerSignature, OperationDescriptor, ParameterDecl, PatchEncoding, ResourceIdentity};
//!
//! let descriptor = OperationDescriptor::from_signature(
//!     HandlerSignature::patch("patch_patient")
//!         .resource_type("Patient")
//!         .param(ParameterDecl::identity())
//!         .param(ParameterDecl::patch_type())
//!         .param(ParameterDecl::body()),
//! )
//! .unwrap();
//!
//! let identity = descriptor.resolve_identity(&ResourceIdentity::untyped("123")).unwrap();
//! assert_eq!(identity.to_string(), "Patient/123");
//! assert!(descriptor.accepts(PatchEncoding::JsonPatch));
//! ```

pub mod args;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod observability;
pub mod types;

pub use args::{ArgValue, CallArguments, FromArgument, QueryArgument, QueryParamType, QueryValue};
pub use descriptor::{
    ArgumentsBuilder, HandlerSignature, OperationDescriptor, OperationKind, ParamRole,
    ParameterDecl, QueryParamSpec, ResourceTypeBinding,
};
pub use error::{Error, ErrorCategory, ErrorOutcome, IssueSeverity, OutcomeIssue, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{InboundRequest, OutboundInvocation, PatchEncoding, ResourceIdentity, Verb};

// Re-exported so generated and downstream code can name them without extra dependencies
pub use bytes::Bytes;
pub use http::{HeaderMap, StatusCode};
