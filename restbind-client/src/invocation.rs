//! Outbound invocation building
//!
//! The client half of an operation. Given the same [`OperationDescriptor`]
//! the server registered and positional [`CallArguments`], build the one
//! [`OutboundInvocation`] a server would bind back to those arguments.
//!
//! Building is deterministic: equal inputs give equal invocations and
//! byte-identical targets, with query parameters in declaration order.
//!
//! # Examples
//!
//! ```rust
//! use restbind_client::ClientInvocationBuilder;
//! use restbind_core::{PatchEncoding, ResourceIdentity};
//!
//! let invocation = ClientInvocationBuilder::patch(
//!     &ResourceIdentity::new("Patient", "123"),
//!     PatchEncoding::JsonMergePatch,
//!     r#"{"active":false}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(invocation.target(), "Patient/123");
//! assert_eq!(invocation.content_type().as_deref(), Some("application/merge-patch+json"));
//! ```

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use restbind_core::codec::encode_path;
use restbind_core::types::{is_valid_id, is_valid_resource_type};
use restbind_core::{
    ArgValue, CallArguments, Error, OperationDescriptor, OutboundInvocation, PatchEncoding,
    QueryParamSpec, QueryValue, ResourceIdentity, Result, Verb,
};

/// Builds an outbound request from a descriptor and its arguments
pub trait InvocationBuilder: Send + Sync {
    fn build(&self, descriptor: &OperationDescriptor, args: &CallArguments) -> Result<OutboundInvocation>;
}

/// Invocation builder for PATCH operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientInvocationBuilder;

impl ClientInvocationBuilder {
    /// PATCH invocation for an identity that already carries its type
    pub fn patch(
        identity: &ResourceIdentity,
        encoding: PatchEncoding,
        body: impl Into<Bytes>,
    ) -> Result<OutboundInvocation> {
        if !identity.has_resource_type() {
            return Err(Error::InvalidArgument(format!(
                "identity '{identity}' has no resource type"
            )));
        }
        check_identity(identity)?;
        Ok(OutboundInvocation::new(
            Verb::Patch,
            encode_path(&identity.path_segments()),
            Vec::new(),
            content_type_headers(encoding),
            body,
        ))
    }
}

impl InvocationBuilder for ClientInvocationBuilder {
    fn build(&self, descriptor: &OperationDescriptor, args: &CallArguments) -> Result<OutboundInvocation> {
        if args.len() != descriptor.roles().len() {
            return Err(Error::InvariantViolation(format!(
                "operation '{}' takes {} arguments, got {}",
                descriptor.name(),
                descriptor.roles().len(),
                args.len()
            )));
        }

        let identity = match slot(args, descriptor.identity_index())? {
            ArgValue::Identity(identity) => descriptor.resolve_identity(identity)?,
            ArgValue::Unset => {
                return Err(Error::InvariantViolation("identity can not be null".to_string()))
            }
            other => return Err(wrong_slot(descriptor, "identity", other)),
        };
        check_identity(&identity)?;

        let encoding = match slot(args, descriptor.patch_type_index())? {
            ArgValue::PatchType(encoding) => *encoding,
            other => return Err(wrong_slot(descriptor, "patch type", other)),
        };
        if !descriptor.accepts(encoding) {
            return Err(Error::InvalidArgument(format!(
                "operation '{}' does not accept {encoding}",
                descriptor.name()
            )));
        }

        let body = match slot(args, descriptor.body_index())? {
            ArgValue::Body(body) => body.clone(),
            other => return Err(wrong_slot(descriptor, "body", other)),
        };

        let mut query = Vec::new();
        for (index, spec) in descriptor.query_slots() {
            append_query(&mut query, spec, slot(args, index)?)?;
        }

        Ok(OutboundInvocation::new(
            descriptor.verb(),
            encode_path(&identity.path_segments()),
            query,
            content_type_headers(encoding),
            body,
        ))
    }
}

/// Reject identities a server would refuse to bind
fn check_identity(identity: &ResourceIdentity) -> Result<()> {
    if let Some(resource_type) = identity.resource_type() {
        if !is_valid_resource_type(resource_type) {
            return Err(Error::InvalidArgument(format!(
                "invalid resource type: '{resource_type}'"
            )));
        }
    }
    if !is_valid_id(identity.id()) {
        return Err(Error::InvalidArgument(format!(
            "invalid resource id: '{}'",
            identity.id()
        )));
    }
    match identity.version() {
        Some(version) if !is_valid_id(version) => Err(Error::InvalidArgument(format!(
            "invalid resource version: '{version}'"
        ))),
        _ => Ok(()),
    }
}

fn slot(args: &CallArguments, index: usize) -> Result<&ArgValue> {
    args.get(index)
        .ok_or_else(|| Error::InvariantViolation(format!("no argument at position {index}")))
}

fn wrong_slot(descriptor: &OperationDescriptor, role: &str, found: &ArgValue) -> Error {
    Error::InvariantViolation(format!(
        "{role} argument of operation '{}' holds a {}",
        descriptor.name(),
        found.kind()
    ))
}

fn append_query(query: &mut Vec<(String, String)>, spec: &QueryParamSpec, value: &ArgValue) -> Result<()> {
    match value {
        value if spec.required && value_is_empty(value) => Err(Error::MissingQueryParameter {
            name: spec.name.clone(),
        }),
        ArgValue::Unset => Ok(()),
        ArgValue::Query(value) if value.param_type() == spec.param_type => {
            query.extend(
                value
                    .to_query_strings()
                    .into_iter()
                    .map(|value| (spec.name.clone(), value)),
            );
            Ok(())
        }
        other => Err(Error::InvalidArgument(format!(
            "query parameter '{}' expects {}, got {}",
            spec.name,
            spec.param_type,
            describe(other)
        ))),
    }
}

/// An empty list sends no pairs, which the server reads as absent
fn value_is_empty(value: &ArgValue) -> bool {
    match value {
        ArgValue::Unset => true,
        ArgValue::Query(QueryValue::TextList(values)) => values.is_empty(),
        _ => false,
    }
}

fn describe(value: &ArgValue) -> String {
    match value {
        ArgValue::Query(value) => value.param_type().to_string(),
        other => other.kind().to_string(),
    }
}

fn content_type_headers(encoding: PatchEncoding) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(encoding.content_type()));
    headers
}
