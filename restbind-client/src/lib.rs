//! Client half of restbind
//!
//! Builds the outbound request for an operation from the same descriptor the
//! server registers, so both sides agree on paths, content types and query
//! parameters by construction.
//!
//! # Core Features
//!
//! - **Invocation building**: [`ClientInvocationBuilder`] turns positional
//!   arguments into a deterministic [`OutboundInvocation`](restbind_core::OutboundInvocation)
//! - **Pluggable transport**: [`RestClient`] sends through any [`Transport`]
//! - **Response interpretation**: success becomes a [`MethodOutcome`], an
//!   `OperationOutcome` error body becomes [`Error::Remote`](restbind_core::Error::Remote)
//! - **Observability**: OpenTelemetry metrics via [`ClientMetrics`]
//!
//! # Quick Start
//!
//! ```rust
//! use restbind_client::{ClientInvocationBuilder, InvocationBuilder};
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
//! let args = descriptor
//!     .arguments()
//!     .identity(ResourceIdentity::untyped("123"))
//!     .patch_type(PatchEncoding::JsonPatch)
//!     .body(r#"[{"op":"replace","path":"/active","value":false}]"#)
//!     .build()
//!     .unwrap();
//!
//! let invocation = ClientInvocationBuilder.build(&descriptor, &args).unwrap();
//! assert_eq!(invocation.target(), "Patient/123");
//! ```

mod client;
mod invocation;
mod metrics;

pub use client::{identity_from_location, MethodOutcome, RestClient, RestClientBuilder, Transport, TransportResponse};
pub use invocation::{ClientInvocationBuilder, InvocationBuilder};
pub use metrics::ClientMetrics;
