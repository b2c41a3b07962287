//! Positional call arguments
//!
//! A handler receives its arguments as [`CallArguments`]: one [`ArgValue`]
//! per declared parameter, in declaration order. The server-side binder
//! fills the slots from a request; a client fills them from the values the
//! caller passed and hands them to the invocation builder.
//!
//! Handlers pull typed values back out with [`CallArguments::take_as`],
//! which goes through the [`FromArgument`] trait.
//!
//! ```rust
//! use restbind_core::{ArgValue, CallArguments, PatchEncoding, ResourceIdentity};
//!
//! let mut args = CallArguments::from(vec![
//!     ArgValue::from(ResourceIdentity::new("Patient", "123")),
//!     ArgValue::from(PatchEncoding::JsonPatch),
//!     ArgValue::Unset,
//! ]);
//!
//! let id: ResourceIdentity = args.take_as(0).unwrap();
//! let encoding: PatchEncoding = args.take_as(1).unwrap();
//! let format: Option<String> = args.take_as(2).unwrap();
//!
//! assert_eq!(id.to_string(), "Patient/123");
//! assert_eq!(encoding, PatchEncoding::JsonPatch);
//! assert!(format.is_none());
//! ```

use crate::error::{Error, Result};
use crate::types::{PatchEncoding, ResourceIdentity};
use bytes::Bytes;
use std::fmt;

/// Declared type of a query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryParamType {
    /// Single string value
    Text,
    /// Single signed integer
    Integer,
    /// Single `true` / `false`
    Boolean,
    /// Every occurrence of a repeated parameter, in request order
    TextList,
}

impl QueryParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryParamType::Text => "text",
            QueryParamType::Integer => "integer",
            QueryParamType::Boolean => "boolean",
            QueryParamType::TextList => "text list",
        }
    }

    /// Convert the raw values received for `name`
    ///
    /// Scalar types take exactly one value. Booleans follow FHIR and only
    /// accept lower-case `true` and `false`.
    pub fn convert(&self, name: &str, values: &[&str]) -> Result<QueryValue> {
        let raw = match (self, values) {
            (QueryParamType::TextList, _) => {
                return Ok(QueryValue::TextList(values.iter().map(|v| v.to_string()).collect()))
            }
            (_, [single]) => *single,
            _ => {
                return Err(Error::InvalidQueryParameter {
                    name: name.to_string(),
                    value: values.join(","),
                    reason: format!("expected a single value, found {}", values.len()),
                })
            }
        };

        let invalid = |reason: &str| Error::InvalidQueryParameter {
            name: name.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        match self {
            QueryParamType::Text => Ok(QueryValue::Text(raw.to_string())),
            QueryParamType::Integer => raw
                .parse::<i64>()
                .map(QueryValue::Integer)
                .map_err(|e| invalid(&format!("not an integer ({e})"))),
            QueryParamType::Boolean => match raw {
                "true" => Ok(QueryValue::Boolean(true)),
                "false" => Ok(QueryValue::Boolean(false)),
                _ => Err(invalid("expected 'true' or 'false'")),
            },
            QueryParamType::TextList => Ok(QueryValue::TextList(vec![raw.to_string()])),
        }
    }
}

impl fmt::Display for QueryParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value of a query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    TextList(Vec<String>),
}

impl QueryValue {
    pub fn param_type(&self) -> QueryParamType {
        match self {
            QueryValue::Text(_) => QueryParamType::Text,
            QueryValue::Integer(_) => QueryParamType::Integer,
            QueryValue::Boolean(_) => QueryParamType::Boolean,
            QueryValue::TextList(_) => QueryParamType::TextList,
        }
    }

    /// Wire values, one per query pair
    pub fn to_query_strings(&self) -> Vec<String> {
        match self {
            QueryValue::Text(value) => vec![value.clone()],
            QueryValue::Integer(value) => vec![value.to_string()],
            QueryValue::Boolean(value) => vec![value.to_string()],
            QueryValue::TextList(values) => values.clone(),
        }
    }
}

/// One argument slot
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgValue {
    /// No value: an absent optional parameter or an unused slot
    #[default]
    Unset,
    Identity(ResourceIdentity),
    PatchType(PatchEncoding),
    Body(Bytes),
    Query(QueryValue),
}

impl ArgValue {
    /// Short name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Unset => "unset",
            ArgValue::Identity(_) => "identity",
            ArgValue::PatchType(_) => "patch type",
            ArgValue::Body(_) => "body",
            ArgValue::Query(_) => "query value",
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, ArgValue::Unset)
    }
}

impl From<ResourceIdentity> for ArgValue {
    fn from(value: ResourceIdentity) -> Self {
        ArgValue::Identity(value)
    }
}

impl From<PatchEncoding> for ArgValue {
    fn from(value: PatchEncoding) -> Self {
        ArgValue::PatchType(value)
    }
}

impl From<Bytes> for ArgValue {
    fn from(value: Bytes) -> Self {
        ArgValue::Body(value)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(value: Vec<u8>) -> Self {
        ArgValue::Body(Bytes::from(value))
    }
}

impl From<QueryValue> for ArgValue {
    fn from(value: QueryValue) -> Self {
        ArgValue::Query(value)
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Query(QueryValue::Text(value))
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Query(QueryValue::Text(value.to_string()))
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Query(QueryValue::Integer(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Query(QueryValue::Boolean(value))
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(value: Vec<String>) -> Self {
        ArgValue::Query(QueryValue::TextList(value))
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ArgValue::Unset)
    }
}

/// Extraction of a typed value from an argument slot
///
/// The binder has already checked every slot against its declared role, so
/// a mismatch here means the handler asked for the wrong slot. That is
/// reported as an invariant violation, not as a client error.
pub trait FromArgument: Sized {
    fn from_argument(value: ArgValue) -> Result<Self>;
}

fn wrong_slot(expected: &str, found: &ArgValue) -> Error {
    Error::InvariantViolation(format!(
        "argument slot holds {}, expected {}",
        found.kind(),
        expected
    ))
}

impl FromArgument for ArgValue {
    fn from_argument(value: ArgValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromArgument for ResourceIdentity {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Identity(identity) => Ok(identity),
            other => Err(wrong_slot("identity", &other)),
        }
    }
}

impl FromArgument for PatchEncoding {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::PatchType(encoding) => Ok(encoding),
            other => Err(wrong_slot("patch type", &other)),
        }
    }
}

impl FromArgument for Bytes {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Body(body) => Ok(body),
            other => Err(wrong_slot("body", &other)),
        }
    }
}

impl FromArgument for Vec<u8> {
    fn from_argument(value: ArgValue) -> Result<Self> {
        Bytes::from_argument(value).map(|body| body.to_vec())
    }
}

impl FromArgument for String {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Query(QueryValue::Text(text)) => Ok(text),
            // A text body is also readable as a string
            ArgValue::Body(body) => String::from_utf8(body.to_vec())
                .map_err(|e| Error::InvalidRequest(format!("Body is not valid UTF-8: {e}"))),
            other => Err(wrong_slot("text", &other)),
        }
    }
}

impl FromArgument for i64 {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Query(QueryValue::Integer(number)) => Ok(number),
            other => Err(wrong_slot("integer", &other)),
        }
    }
}

impl FromArgument for bool {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Query(QueryValue::Boolean(flag)) => Ok(flag),
            other => Err(wrong_slot("boolean", &other)),
        }
    }
}

impl FromArgument for Vec<String> {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Query(QueryValue::TextList(values)) => Ok(values),
            ArgValue::Unset => Ok(Vec::new()),
            other => Err(wrong_slot("text list", &other)),
        }
    }
}

impl<T: FromArgument> FromArgument for Option<T> {
    fn from_argument(value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Unset => Ok(None),
            other => T::from_argument(other).map(Some),
        }
    }
}

/// Rust types usable as query parameters in generated handlers
///
/// `Option<T>` marks the parameter optional. A `Vec<String>` is never
/// required: absence is an empty list.
pub trait QueryArgument: FromArgument {
    const PARAM_TYPE: QueryParamType;
    const REQUIRED: bool = true;
}

impl QueryArgument for String {
    const PARAM_TYPE: QueryParamType = QueryParamType::Text;
}

impl QueryArgument for i64 {
    const PARAM_TYPE: QueryParamType = QueryParamType::Integer;
}

impl QueryArgument for bool {
    const PARAM_TYPE: QueryParamType = QueryParamType::Boolean;
}

impl QueryArgument for Vec<String> {
    const PARAM_TYPE: QueryParamType = QueryParamType::TextList;
    const REQUIRED: bool = false;
}

impl<T: QueryArgument> QueryArgument for Option<T> {
    const PARAM_TYPE: QueryParamType = T::PARAM_TYPE;
    const REQUIRED: bool = false;
}

/// Positional arguments for one handler invocation
///
/// The length always equals the number of declared parameters. Values are
/// moved out with [`take`](Self::take), which leaves `Unset` behind, so each
/// value is consumed once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallArguments {
    slots: Vec<ArgValue>,
}

impl CallArguments {
    /// `len` unset slots
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![ArgValue::Unset; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgValue> {
        self.slots.iter()
    }

    /// Store a value; the slot must exist
    pub fn set(&mut self, index: usize, value: impl Into<ArgValue>) -> Result<()> {
        let len = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            Error::InvariantViolation(format!("argument index {index} out of range for {len} slots"))
        })?;
        *slot = value.into();
        Ok(())
    }

    /// Move a value out, leaving `Unset`
    ///
    /// An index past the end yields `Unset`.
    pub fn take(&mut self, index: usize) -> ArgValue {
        self.slots
            .get_mut(index)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Move a value out and convert it
    pub fn take_as<T: FromArgument>(&mut self, index: usize) -> Result<T> {
        T::from_argument(self.take(index))
    }

    pub fn into_vec(self) -> Vec<ArgValue> {
        self.slots
    }
}

impl From<Vec<ArgValue>> for CallArguments {
    fn from(slots: Vec<ArgValue>) -> Self {
        Self { slots }
    }
}

impl FromIterator<ArgValue> for CallArguments {
    fn from_iter<I: IntoIterator<Item = ArgValue>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}
