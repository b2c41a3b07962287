//! restbind - REST operation binding for FHIR-style PATCH
//!
//! This is the convenience crate that re-exports the restbind sub-crates.
//! Depend on it when one crate needs both the server and client halves.
//!
//! # Architecture
//!
//! - **restbind-core**: identities, encodings, descriptors, codec, errors, observability
//! - **restbind-server**: request matching, argument binding, dispatch, middleware
//! - **restbind-client**: outbound invocation building and a transport-agnostic client
//! - **restbind-macros**: `#[patch_operation]` handler generation
//!
//! # Quick Start - Server
//!
//! ```rust
//! use restbind::core::{HandlerSignature, InboundRequest, ParameterDecl, Verb};
//! use restbind::server::{from_patch_fn, Dispatcher, HandlerOutcome};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let signature = HandlerSignature::patch("patch_patient")
//!     .resource_type("Patient")
//!     .param(ParameterDecl::identity())
//!     .param(ParameterDecl::patch_type())
//!     .param(ParameterDecl::body());
//!
//! let dispatcher = Dispatcher::builder()
//!     .operation(from_patch_fn(signature, |call| async move {
//!         Ok(Some(HandlerOutcome::new().with_id(call.identity.with_version("2"))))
//!     }))
//!     .build()?;
//!
//! let request = InboundRequest::new(Verb::Patch, ["Patient", "123"])
//!     .with_content_type("application/json-patch+json")?
//!     .with_body("[]");
//! let response = dispatcher.handle(&request).await;
//! assert_eq!(response.status.as_u16(), 200);
//! # Ok(())
//! # }
//! ```
//!
//! # Quick Start - Client
//!
//! ```rust
//! use restbind::client::ClientInvocationBuilder;
//! use restbind::core::{PatchEncoding, ResourceIdentity};
//!
//! let invocation = ClientInvocationBuilder::patch(
//!     &ResourceIdentity::new("Patient", "123"),
//!     PatchEncoding::JsonMergePatch,
//!     r#"{"active":false}"#,
//! )
//! .unwrap();
//! assert_eq!(invocation.path(), "Patient/123");
//! ```

pub use restbind_client as client;
pub use restbind_core as core;
pub use restbind_macros as macros;
pub use restbind_server as server;

pub use restbind_client::RestClient;
pub use restbind_macros::patch_operation;
pub use restbind_server::Dispatcher;
