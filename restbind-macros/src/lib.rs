//! Procedural macros for restbind
//!
//! Writing a [`HandlerSignature`] by hand means listing every parameter role
//! twice: once in the signature and once when reading the slots back out of
//! `CallArguments`. The `#[patch_operation]` attribute derives both from the
//! function's own parameter list.
//!
//! # Without the macro
//!
//! ```ignore
//! pub fn patch_patient() -> Box<dyn OperationHandler> {
//!     let signature = HandlerSignature::patch("patch_patient")
//!         .resource_type("Patient")
//!         .param(ParameterDecl::identity())
//!         .param(ParameterDecl::patch_type())
//!         .param(ParameterDecl::body());
//!     from_fn(signature, |mut args| async move {
//!         let id: ResourceIdentity = args.take_as(0)?;
//!         let encoding: PatchEncoding = args.take_as(1)?;
//!         let body: Bytes = args.take_as(2)?;
//!         Ok(Some(HandlerOutcome::new().with_id(id)))
//!     })
//! }
//! ```
//!
//! # With the macro
//!
//! ```ignore
//! #[patch_operation(resource = "Patient")]
//! async fn patch_patient(
//!     id: ResourceIdentity,
//!     encoding: PatchEncoding,
//!     #[body] body: Bytes,
//! ) -> Result<Option<HandlerOutcome>> {
//!     Ok(Some(HandlerOutcome::new().with_id(id)))
//! }
//! ```
//!
//! [`HandlerSignature`]: https://docs.rs/restbind-core/latest/restbind_core/struct.HandlerSignature.html

mod operation;

use proc_macro::TokenStream;

/// Attribute macro for defining PATCH operation handlers
///
/// Turns an async function into a factory `fn name() -> Box<dyn OperationHandler>`
/// whose signature is read off the parameter list.
///
/// # Arguments
///
/// - `resource = "Patient"`: bind to one resource type. Without it the
///   operation serves every type and takes it from the request path.
/// - `crate = "restbind::server"`: path to the server crate, when it is not
///   a direct dependency.
///
/// # Parameter Roles
///
/// | Parameter | Role |
/// |---|---|
/// | type `ResourceIdentity` | resource identity |
/// | type `PatchEncoding` | patch type |
/// | `#[body]` | request body (`Bytes`, `Vec<u8>` or `String`) |
/// | `#[query("name")]` | query parameter; type and requiredness come from `QueryArgument` |
///
/// Any other parameter is rejected at compile time. A function missing the
/// patch type or body still compiles; `DispatcherBuilder::build` reports it.
///
/// # Examples
///
/// ```ignore
/// #[patch_operation]
/// async fn patch_any(
///     id: ResourceIdentity,
///     encoding: PatchEncoding,
///     #[body] body: String,
///     #[query("_pretty")] pretty: Option<bool>,
/// ) -> Result<Option<HandlerOutcome>> {
///     Ok(None)
/// }
///
/// let dispatcher = Dispatcher::builder().operation(patch_any()).build()?;
/// ```
///
/// The generated code reaches everything through `::restbind_server`. A crate
/// that only depends on `restbind` names the re-export instead:
///
/// ```ignore
/// #[restbind::patch_operation(crate = "restbind::server", resource = "Patient")]
/// async fn patch_patient(/* ... */) -> Result<Option<HandlerOutcome>> { /* ... */ }
/// ```
#[proc_macro_attribute]
pub fn patch_operation(attr: TokenStream, item: TokenStream) -> TokenStream {
    operation::patch_operation_impl(attr.into(), item.into()).into()
}
