//! Operation descriptors
//!
//! A handler declares what it needs with a [`HandlerSignature`]: its name,
//! the operation kind, the verb, the resource type it serves and one
//! [`ParameterDecl`] per parameter. [`OperationDescriptor::from_signature`]
//! validates that declaration once, at registration, and records where each
//! role sits so that per-request code never has to search for it.
//!
//! # Parameter Roles
//!
//! | Role | Filled from (server) | Sent as (client) |
//! |---|---|---|
//! | `ResourceIdentity` | `Type/id[/_history/vid]` path | request path |
//! | `PatchType` | `Content-Type` header | `Content-Type` header |
//! | `Body` | raw request body | raw request body |
//! | `Query(spec)` | named query parameter | named query parameter |
//! | `Unused` | always `Unset` | ignored |
//!
//! A PATCH signature must declare exactly one identity, one patch type and
//! one body. Anything else is a configuration error that stops the
//! dispatcher from being built.
//!
//! # Examples
//!
//! ```rust
//! use restbind_core::{HandlerSignature, OperationDescriptor, ParameterDecl, QueryParamType};
//!
//! let signature = HandlerSignature::patch("patch_patient")
//!     .resource_type("Patient")
//!     .param(ParameterDecl::identity())
//!     .param(ParameterDecl::optional_query("_format", QueryParamType::Text))
//!     .param(ParameterDecl::patch_type())
//!     .param(ParameterDecl::body());
//!
//! let descriptor = OperationDescriptor::from_signature(signature).unwrap();
//! assert_eq!(descriptor.identity_index(), 0);
//! assert_eq!(descriptor.patch_type_index(), 2);
//! assert_eq!(descriptor.body_index(), 3);
//! ```

use crate::args::{ArgValue, CallArguments, QueryParamType};
use crate::error::{Error, Result};
use crate::types::{is_valid_resource_type, PatchEncoding, ResourceIdentity, Verb};
use std::collections::HashSet;
use std::fmt;

/// Kind of REST operation; selects the matching and binding strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Partial update of an existing instance
    Patch,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Patch => "patch",
        }
    }

    /// Whether a handler may complete without returning anything
    pub fn allows_empty_return(&self) -> bool {
        match self {
            OperationKind::Patch => true,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an operation determines the resource type it acts on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceTypeBinding {
    /// Bound to one resource type at registration
    Fixed(String),
    /// Serves every type; the type comes from the request path
    FromPath,
}

impl ResourceTypeBinding {
    pub fn fixed(resource_type: impl Into<String>) -> Self {
        ResourceTypeBinding::Fixed(resource_type.into())
    }

    /// Configured type, if fixed
    pub fn resource_type(&self) -> Option<&str> {
        match self {
            ResourceTypeBinding::Fixed(resource_type) => Some(resource_type),
            ResourceTypeBinding::FromPath => None,
        }
    }

    /// Whether a request path naming `path_type` is served by this binding
    pub fn accepts(&self, path_type: &str) -> bool {
        match self {
            ResourceTypeBinding::Fixed(resource_type) => resource_type == path_type,
            ResourceTypeBinding::FromPath => is_valid_resource_type(path_type),
        }
    }

    /// Whether some request path is served by both bindings
    pub fn overlaps(&self, other: &ResourceTypeBinding) -> bool {
        match (self, other) {
            (ResourceTypeBinding::Fixed(a), ResourceTypeBinding::Fixed(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for ResourceTypeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceTypeBinding::Fixed(resource_type) => f.write_str(resource_type),
            ResourceTypeBinding::FromPath => f.write_str("{type}"),
        }
    }
}

/// Declaration of one query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryParamSpec {
    pub name: String,
    pub param_type: QueryParamType,
    pub required: bool,
}

impl QueryParamSpec {
    pub fn new(name: impl Into<String>, param_type: QueryParamType, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type,
            required,
        }
    }
}

/// What a parameter slot is for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamRole {
    ResourceIdentity,
    PatchType,
    Body,
    Query(QueryParamSpec),
    Unused,
}

impl ParamRole {
    pub fn label(&self) -> &'static str {
        match self {
            ParamRole::ResourceIdentity => "ResourceIdentity",
            ParamRole::PatchType => "PatchType",
            ParamRole::Body => "Body",
            ParamRole::Query(_) => "Query",
            ParamRole::Unused => "Unused",
        }
    }
}

/// One declared handler parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDecl {
    pub role: ParamRole,
    /// Source-level parameter name, used in diagnostics
    pub label: Option<String>,
}

impl ParameterDecl {
    pub fn new(role: ParamRole) -> Self {
        Self { role, label: None }
    }

    pub fn identity() -> Self {
        Self::new(ParamRole::ResourceIdentity)
    }

    pub fn patch_type() -> Self {
        Self::new(ParamRole::PatchType)
    }

    pub fn body() -> Self {
        Self::new(ParamRole::Body)
    }

    pub fn query(name: impl Into<String>, param_type: QueryParamType) -> Self {
        Self::new(ParamRole::Query(QueryParamSpec::new(name, param_type, true)))
    }

    pub fn optional_query(name: impl Into<String>, param_type: QueryParamType) -> Self {
        Self::new(ParamRole::Query(QueryParamSpec::new(name, param_type, false)))
    }

    pub fn unused() -> Self {
        Self::new(ParamRole::Unused)
    }

    /// Attach the source-level name
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn describe(&self, index: usize) -> String {
        match &self.label {
            Some(label) => format!("parameter #{index} ('{label}')"),
            None => format!("parameter #{index}"),
        }
    }
}

/// Declared shape of a handler, before validation
///
/// Built by handler adapters (by hand or by the `#[patch_operation]`
/// macro) and consumed by [`OperationDescriptor::from_signature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSignature {
    pub name: String,
    pub kind: OperationKind,
    pub verb: Verb,
    pub resource_binding: ResourceTypeBinding,
    pub params: Vec<ParameterDecl>,
    pub accepted_encodings: Vec<PatchEncoding>,
    pub allows_empty_return: bool,
}

impl HandlerSignature {
    /// PATCH signature serving every resource type and every encoding
    pub fn patch(name: impl Into<String>) -> Self {
        let kind = OperationKind::Patch;
        Self {
            name: name.into(),
            kind,
            verb: Verb::Patch,
            resource_binding: ResourceTypeBinding::FromPath,
            params: Vec::new(),
            accepted_encodings: PatchEncoding::ALL.to_vec(),
            allows_empty_return: kind.allows_empty_return(),
        }
    }

    /// Bind to one resource type
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_binding = ResourceTypeBinding::fixed(resource_type);
        self
    }

    /// Take the resource type from the request path
    pub fn from_path(mut self) -> Self {
        self.resource_binding = ResourceTypeBinding::FromPath;
        self
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = verb;
        self
    }

    pub fn param(mut self, param: ParameterDecl) -> Self {
        self.params.push(param);
        self
    }

    /// Restrict the encodings this operation accepts
    pub fn accept(mut self, encodings: impl IntoIterator<Item = PatchEncoding>) -> Self {
        self.accepted_encodings = encodings.into_iter().collect();
        self
    }

    pub fn allows_empty_return(mut self, allowed: bool) -> Self {
        self.allows_empty_return = allowed;
        self
    }
}

/// Validated, immutable description of a registered operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    name: String,
    kind: OperationKind,
    verb: Verb,
    resource_binding: ResourceTypeBinding,
    roles: Vec<ParamRole>,
    identity_index: usize,
    patch_type_index: usize,
    body_index: usize,
    accepted_encodings: Vec<PatchEncoding>,
    allows_empty_return: bool,
}

impl OperationDescriptor {
    /// Validate a signature and record its slot positions
    ///
    /// Checks run in a fixed order so the reported error is predictable:
    /// missing patch type, missing body, missing identity, repeated roles,
    /// query names, resource type, accepted encodings. The declared verb is
    /// kept as given.
    pub fn from_signature(signature: HandlerSignature) -> Result<Self> {
        let HandlerSignature {
            name,
            kind,
            verb,
            resource_binding,
            params,
            accepted_encodings,
            allows_empty_return,
        } = signature;

        let mut identity_index = None;
        let mut patch_type_index = None;
        let mut body_index = None;
        let mut duplicate = None;
        let mut query_names = HashSet::new();
        let mut bad_query = None;

        for (index, param) in params.iter().enumerate() {
            let seen = match &param.role {
                ParamRole::ResourceIdentity => &mut identity_index,
                ParamRole::PatchType => &mut patch_type_index,
                ParamRole::Body => &mut body_index,
                ParamRole::Query(spec) => {
                    if bad_query.is_none() {
                        if spec.name.trim().is_empty() {
                            bad_query =
                                Some(format!("{} has an empty query parameter name", param.describe(index)));
                        } else if !query_names.insert(spec.name.clone()) {
                            bad_query = Some(format!(
                                "query parameter '{}' is declared more than once",
                                spec.name
                            ));
                        }
                    }
                    continue;
                }
                ParamRole::Unused => continue,
            };

            if seen.is_some() {
                duplicate.get_or_insert_with(|| {
                    format!("{} is a second {} parameter", param.describe(index), param.role.label())
                });
            } else {
                *seen = Some(index);
            }
        }

        let patch_type_index = patch_type_index.ok_or_else(|| {
            Error::configuration(&name, "method has no parameter with role PatchType")
        })?;
        let body_index = body_index
            .ok_or_else(|| Error::configuration(&name, "method has no parameter with role Body"))?;
        let identity_index = identity_index.ok_or_else(|| {
            Error::configuration(&name, "method has no parameter with role ResourceIdentity")
        })?;

        if let Some(reason) = duplicate.or(bad_query) {
            return Err(Error::configuration(&name, reason));
        }

        if let ResourceTypeBinding::Fixed(resource_type) = &resource_binding {
            if !is_valid_resource_type(resource_type) {
                return Err(Error::configuration(
                    &name,
                    format!("'{resource_type}' is not a valid resource type name"),
                ));
            }
        }

        let mut unique = Vec::with_capacity(accepted_encodings.len());
        for encoding in accepted_encodings {
            if !unique.contains(&encoding) {
                unique.push(encoding);
            }
        }
        if unique.is_empty() {
            return Err(Error::configuration(&name, "no accepted patch encodings"));
        }

        Ok(Self {
            name,
            kind,
            verb,
            resource_binding,
            roles: params.into_iter().map(|param| param.role).collect(),
            identity_index,
            patch_type_index,
            body_index,
            accepted_encodings: unique,
            allows_empty_return,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn resource_binding(&self) -> &ResourceTypeBinding {
        &self.resource_binding
    }

    pub fn roles(&self) -> &[ParamRole] {
        &self.roles
    }

    pub fn identity_index(&self) -> usize {
        self.identity_index
    }

    pub fn patch_type_index(&self) -> usize {
        self.patch_type_index
    }

    pub fn body_index(&self) -> usize {
        self.body_index
    }

    pub fn accepted_encodings(&self) -> &[PatchEncoding] {
        &self.accepted_encodings
    }

    pub fn accepts(&self, encoding: PatchEncoding) -> bool {
        self.accepted_encodings.contains(&encoding)
    }

    pub fn allows_empty_return(&self) -> bool {
        self.allows_empty_return
    }

    /// Query slots in declaration order
    pub fn query_slots(&self) -> impl Iterator<Item = (usize, &QueryParamSpec)> {
        self.roles.iter().enumerate().filter_map(|(index, role)| match role {
            ParamRole::Query(spec) => Some((index, spec)),
            _ => None,
        })
    }

    /// Path pattern for logs, e.g. `Patient/{id}` or `{type}/{id}`
    pub fn path_template(&self) -> String {
        format!("{}/{{id}}", self.resource_binding)
    }

    /// Apply this operation's type rule to an identity
    ///
    /// An untyped identity inherits the fixed type. A typed identity must
    /// agree with it. With a path-derived binding the identity has to carry
    /// its own type.
    pub fn resolve_identity(&self, identity: &ResourceIdentity) -> Result<ResourceIdentity> {
        match (&self.resource_binding, identity.resource_type()) {
            (ResourceTypeBinding::Fixed(expected), None) => {
                Ok(identity.clone().with_resource_type(expected.clone()))
            }
            (ResourceTypeBinding::Fixed(expected), Some(found)) if found != expected => {
                Err(Error::ResourceTypeMismatch {
                    expected: expected.clone(),
                    found: found.to_string(),
                })
            }
            (ResourceTypeBinding::FromPath, None) => Err(Error::InvalidArgument(format!(
                "identity '{identity}' has no resource type and operation '{}' takes its type from the path",
                self.name
            ))),
            (ResourceTypeBinding::FromPath, Some(found)) if !is_valid_resource_type(found) => {
                Err(Error::InvalidArgument(format!("'{found}' is not a valid resource type")))
            }
            _ => Ok(identity.clone()),
        }
    }

    /// Whether some request could match both operations
    pub fn overlaps(&self, other: &OperationDescriptor) -> bool {
        self.kind == other.kind
            && self.verb == other.verb
            && self.resource_binding.overlaps(&other.resource_binding)
            && self
                .accepted_encodings
                .iter()
                .any(|encoding| other.accepts(*encoding))
    }

    /// Fill call arguments by role instead of by position
    pub fn arguments(&self) -> ArgumentsBuilder<'_> {
        ArgumentsBuilder {
            descriptor: self,
            args: CallArguments::new(self.roles.len()),
            error: None,
        }
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.verb, self.path_template())
    }
}

/// Role-addressed construction of [`CallArguments`]
///
/// ```rust
/// use restbind_core::{HandlerSignature, OperationDescriptor, ParameterDecl, PatchEncoding, QueryParamType, ResourceIdentity};
///
/// let descriptor = OperationDescriptor::from_signature(
///     HandlerSignature::patch("patch_patient")
///         .resource_type("Patient")
///         .param(ParameterDecl::body())
///         .param(ParameterDecl::identity())
///         .param(ParameterDecl::patch_type())
///         .param(ParameterDecl::optional_query("_format", QueryParamType::Text)),
/// )
/// .unwrap();
///
/// let args = descriptor
///     .arguments()
///     .identity(ResourceIdentity::untyped("123"))
///     .patch_type(PatchEncoding::JsonPatch)
///     .body("[]")
///     .query("_format", "json")
///     .build()
///     .unwrap();
/// assert_eq!(args.len(), 4);
/// ```
#[derive(Debug)]
pub struct ArgumentsBuilder<'a> {
    descriptor: &'a OperationDescriptor,
    args: CallArguments,
    error: Option<Error>,
}

impl<'a> ArgumentsBuilder<'a> {
    pub fn identity(mut self, identity: ResourceIdentity) -> Self {
        let index = self.descriptor.identity_index;
        self.store(index, ArgValue::Identity(identity));
        self
    }

    pub fn patch_type(mut self, encoding: PatchEncoding) -> Self {
        let index = self.descriptor.patch_type_index;
        self.store(index, ArgValue::PatchType(encoding));
        self
    }

    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        let index = self.descriptor.body_index;
        self.store(index, ArgValue::Body(body.into()));
        self
    }

    /// Set a named query parameter; an unknown name fails at `build`
    pub fn query(mut self, name: &str, value: impl Into<ArgValue>) -> Self {
        let slot = self
            .descriptor
            .query_slots()
            .find(|(_, spec)| spec.name == name)
            .map(|(index, _)| index);

        match slot {
            Some(index) => self.store(index, value.into()),
            None => {
                let operation = self.descriptor.name.clone();
                self.error.get_or_insert_with(|| {
                    Error::InvalidArgument(format!(
                        "operation '{operation}' declares no query parameter '{name}'"
                    ))
                });
            }
        }
        self
    }

    fn store(&mut self, index: usize, value: ArgValue) {
        if let Err(e) = self.args.set(index, value) {
            self.error.get_or_insert(e);
        }
    }

    pub fn build(self) -> Result<CallArguments> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.args),
        }
    }
}
