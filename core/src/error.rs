//! Error types for the declarative client.
//!
//! # Design
//! Each stage of a call owns one error type: descriptor validation
//! (`DescriptorError`), argument binding (`BindingError`), the network
//! (`TransportError`) and response adaptation (`HttpStatusError`,
//! `DecodeError`). The caller-facing `Error` wraps all of them so every
//! façade operation returns a single type, while still letting callers tell
//! "the server rejected the call" apart from "the server answered with the
//! wrong shape."

use std::time::Duration;

use thiserror::Error;

use crate::descriptor::ValueKind;

/// Rule broken by a service descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("no HTTP verb declared")]
    MissingVerb,

    #[error("{count} HTTP verbs declared, expected exactly one")]
    MultipleVerbs { count: usize },

    #[error("method declared more than once")]
    DuplicateMethod,

    #[error("malformed path template: {reason}")]
    MalformedTemplate { reason: String },

    #[error("placeholder {{{placeholder}}} has no path binding")]
    UnboundPlaceholder { placeholder: String },

    #[error("path binding `{name}` matches no placeholder")]
    UnknownPlaceholder { name: String },

    #[error("placeholder {{{placeholder}}} is bound more than once")]
    DuplicatePathBinding { placeholder: String },

    /// Not `Name: value`, or the name is not a token, or the value holds CR, LF or NUL.
    #[error("malformed header `{line}`, expected `Name: value`")]
    MalformedHeader { line: String },

    #[error("parameter {index}: {reason}")]
    InvalidParameter { index: usize, reason: String },

    #[error("body conflict: {reason}")]
    BodyConflict { reason: String },

    #[error("multipart: {reason}")]
    Multipart { reason: String },
}

/// A service descriptor failed validation. The whole service is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service `{service}`, method `{method}`: {violation}")]
pub struct DescriptorError {
    pub service: String,
    pub method: String,
    pub violation: Violation,
}

/// The arguments of one invocation do not satisfy the method's bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("service `{service}` has no method `{method}`")]
    UnknownMethod { service: String, method: String },

    #[error("`{method}` takes {expected} arguments, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("`{method}`: argument `{name}` must not be null")]
    MissingArgument { method: String, name: String },

    #[error("`{method}`: argument `{name}` expected {expected}, got {actual}")]
    TypeMismatch {
        method: String,
        name: String,
        expected: ValueKind,
        actual: &'static str,
    },

    #[error("`{method}`: map argument `{name}` has a null value for key `{key}`")]
    NullMapEntry {
        method: String,
        name: String,
        key: String,
    },

    #[error("`{method}`: path `{value}` contains a `.` or `..` segment")]
    PathTraversal { method: String, value: String },

    #[error("`{method}`: header `{name}` rejected: {reason}")]
    InvalidHeader {
        method: String,
        name: String,
        reason: &'static str,
    },

    #[error("`{method}`: body could not be encoded: {reason}")]
    Encode { method: String, reason: String },

    #[error("`{method}` is declared {declared}, not callable this way")]
    ReturnShape { method: String, declared: &'static str },
}

/// Network-level failure. The call failed; the caller may retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("could not start background call: {0}")]
    Spawn(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// The server answered with a non-2xx status. Decoding was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {}", String::from_utf8_lossy(.body))]
pub struct HttpStatusError {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpStatusError {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// The server answered 2xx but the payload did not match the declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode failed (HTTP {status}): {reason}")]
pub struct DecodeError {
    pub status: u16,
    pub reason: String,
}

/// Outcome of `ResponseAdapter::adapt` when no value could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Status(#[from] HttpStatusError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Encoding or decoding failure reported by a `Codec`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("api url `{0}` must start with http:// or https://")]
    ApiUrl(String),

    #[error("invalid config: {0}")]
    Parse(String),
}

/// Every error a caller of `ServiceClient` can observe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    HttpStatus(#[from] HttpStatusError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The async handle was cancelled before an outcome was delivered.
    #[error("call cancelled")]
    Cancelled,

    /// The outcome of an async handle was already handed out.
    #[error("outcome already taken from this handle")]
    OutcomeTaken,
}

impl From<AdapterError> for Error {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Status(e) => Error::HttpStatus(e),
            AdapterError::Decode(e) => Error::Decode(e),
        }
    }
}
