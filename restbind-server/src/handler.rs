//! Operation handler trait and adapters
//!
//! An [`OperationHandler`] does two things: it declares its shape with
//! [`signature`](OperationHandler::signature), and it runs with bound
//! arguments through [`invoke`](OperationHandler::invoke). The dispatcher
//! calls `signature` exactly once, at registration, and never inspects the
//! handler again on the request path.
//!
//! # Creating Handlers
//!
//! 1. **from_fn**: wrap an async closure over raw [`CallArguments`]
//! 2. **from_patch_fn**: wrap an async closure over a [`PatchCall`] with the
//!    identity, encoding and body already extracted
//! 3. **#[patch_operation]**: generate the handler from a plain async fn
//!    (via restbind-macros)
//!
//! # Examples
//!
//! ```rust
//! use restbind_core::{HandlerSignature, ParameterDecl};
//! use restbind_server::{from_patch_fn, HandlerOutcome};
//!
//! let signature = HandlerSignature::patch("patch_patient")
//!     .resource_type("Patient")
//!     .param(ParameterDecl::identity())
//!     .param(ParameterDecl::patch_type())
//!     .param(ParameterDecl::body());
//!
//! let handler = from_patch_fn(signature, |call| async move {
//!     Ok(Some(HandlerOutcome::new().with_id(call.identity)))
//! });
//! assert_eq!(handler.signature().name, "patch_patient");
//! ```

use crate::response::HandlerOutcome;
use bytes::Bytes;
use restbind_core::{
    CallArguments, Error, FromArgument, HandlerSignature, ParamRole, PatchEncoding,
    ResourceIdentity, Result,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`OperationHandler::invoke`]
///
/// `Ok(None)` is the empty outcome.
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Option<HandlerOutcome>>> + Send>>;

/// A registered operation implementation
pub trait OperationHandler: Send + Sync {
    /// Declared parameter roles and binding options
    fn signature(&self) -> HandlerSignature;

    /// Run with arguments aligned to the declared parameters
    fn invoke(&self, args: CallArguments) -> HandlerResult;
}

/// Handler backed by an async closure over raw arguments
pub struct FnHandler<F> {
    signature: HandlerSignature,
    func: F,
}

impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(CallArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HandlerOutcome>>> + Send + 'static,
{
    fn signature(&self) -> HandlerSignature {
        self.signature.clone()
    }

    fn invoke(&self, args: CallArguments) -> HandlerResult {
        Box::pin((self.func)(args))
    }
}

/// Create a handler from a signature and an async closure over [`CallArguments`]
///
/// The closure reads its slots by position; the positions are those of
/// `signature.params`.
pub fn from_fn<F, Fut>(signature: HandlerSignature, func: F) -> Box<dyn OperationHandler>
where
    F: Fn(CallArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HandlerOutcome>>> + Send + 'static,
{
    Box::new(FnHandler { signature, func })
}

/// Arguments of a PATCH call with the core roles already extracted
#[derive(Debug)]
pub struct PatchCall {
    pub identity: ResourceIdentity,
    pub encoding: PatchEncoding,
    pub body: Bytes,
    rest: CallArguments,
    query_slots: Arc<Vec<(String, usize)>>,
}

impl PatchCall {
    /// Typed value of a declared query parameter, consumed on first read
    pub fn query<T: FromArgument>(&mut self, name: &str) -> Result<T> {
        let index = self
            .query_slots
            .iter()
            .find(|(slot_name, _)| slot_name == name)
            .map(|(_, index)| *index)
            .ok_or_else(|| {
                Error::InvariantViolation(format!("no query parameter '{name}' was declared"))
            })?;
        self.rest.take_as(index)
    }

    /// Body parsed as JSON
    pub fn json_body(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::InvalidRequest(format!("Patch body is not valid JSON: {e}")))
    }
}

struct PatchFnHandler<F> {
    signature: HandlerSignature,
    slots: [Option<usize>; 3],
    query_slots: Arc<Vec<(String, usize)>>,
    func: Arc<F>,
}

impl<F, Fut> OperationHandler for PatchFnHandler<F>
where
    F: Fn(PatchCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HandlerOutcome>>> + Send + 'static,
{
    fn signature(&self) -> HandlerSignature {
        self.signature.clone()
    }

    fn invoke(&self, mut args: CallArguments) -> HandlerResult {
        let func = Arc::clone(&self.func);
        let query_slots = Arc::clone(&self.query_slots);
        let [identity, encoding, body] = self.slots;

        Box::pin(async move {
            let missing = |role: &str| Error::InvariantViolation(format!("handler declares no {role} parameter"));
            let call = PatchCall {
                identity: args.take_as(identity.ok_or_else(|| missing("identity"))?)?,
                encoding: args.take_as(encoding.ok_or_else(|| missing("patch type"))?)?,
                body: args.take_as(body.ok_or_else(|| missing("body"))?)?,
                rest: args,
                query_slots,
            };
            func(call).await
        })
    }
}

/// Create a PATCH handler from an async closure over a [`PatchCall`]
///
/// The identity, encoding and body slots are located from the signature
/// once, here. Query parameters stay reachable by name through
/// [`PatchCall::query`].
pub fn from_patch_fn<F, Fut>(signature: HandlerSignature, func: F) -> Box<dyn OperationHandler>
where
    F: Fn(PatchCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HandlerOutcome>>> + Send + 'static,
{
    let position = |wanted: ParamRole| signature.params.iter().position(|param| param.role == wanted);
    let slots = [
        position(ParamRole::ResourceIdentity),
        position(ParamRole::PatchType),
        position(ParamRole::Body),
    ];
    let query_slots = signature
        .params
        .iter()
        .enumerate()
        .filter_map(|(index, param)| match &param.role {
            ParamRole::Query(spec) => Some((spec.name.clone(), index)),
            _ => None,
        })
        .collect();

    Box::new(PatchFnHandler {
        signature,
        slots,
        query_slots: Arc::new(query_slots),
        func: Arc::new(func),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use restbind_core::{ArgValue, ParameterDecl, QueryParamType};

    fn signature() -> HandlerSignature {
        HandlerSignature::patch("patch_patient")
            .resource_type("Patient")
            .param(ParameterDecl::optional_query("_format", QueryParamType::Text))
            .param(ParameterDecl::body())
            .param(ParameterDecl::identity())
            .param(ParameterDecl::patch_type())
    }

    fn args() -> CallArguments {
        CallArguments::from(vec![
            ArgValue::from("json"),
            ArgValue::from(Bytes::from_static(br#"{"active":false}"#)),
            ArgValue::from(ResourceIdentity::new("Patient", "7")),
            ArgValue::from(PatchEncoding::JsonMergePatch),
        ])
    }

    #[tokio::test]
    async fn test_from_fn_passes_arguments() {
        let handler = from_fn(signature(), |mut args| async move {
            let id: ResourceIdentity = args.take_as(2)?;
            Ok(Some(HandlerOutcome::new().with_id(id)))
        });

        let outcome = handler.invoke(args()).await.unwrap().unwrap();
        assert_eq!(outcome.id.unwrap().to_string(), "Patient/7");
        assert_eq!(handler.signature(), signature());
    }

    #[tokio::test]
    async fn test_from_patch_fn_extracts_roles() {
        let handler = from_patch_fn(signature(), |mut call| async move {
            assert_eq!(call.encoding, PatchEncoding::JsonMergePatch);
            let format: Option<String> = call.query("_format")?;
            assert_eq!(format.as_deref(), Some("json"));
            let patch = call.json_body()?;
            Ok(Some(
                HandlerOutcome::new()
                    .with_id(call.identity)
                    .with_resource(patch),
            ))
        });

        let outcome = handler.invoke(args()).await.unwrap().unwrap();
        assert_eq!(outcome.resource.unwrap()["active"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_from_patch_fn_unknown_query_is_invariant_violation() {
        let handler = from_patch_fn(signature(), |mut call| async move {
            let _: Option<String> = call.query("_nope")?;
            Ok(None)
        });

        let result = handler.invoke(args()).await;
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_empty_outcome() {
        let handler = from_fn(signature(), |_| async { Ok(None) });
        assert!(handler.invoke(args()).await.unwrap().is_none());
    }
}
