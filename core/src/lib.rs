//! Declarative HTTP service client.
//!
//! # Overview
//! A caller describes a remote service as data (a `ServiceDescriptor` with
//! base path, per-method verb, path template, static headers and parameter
//! bindings) and invokes its methods by name with positional arguments. The
//! engine validates the descriptor once, builds a concrete request per call,
//! sends it through a pluggable `Transport` and decodes the response into
//! the caller's type, either directly or through a cancellable
//! `AsyncHandle`.
//!
//! # Design
//! - `Resolver` validates each descriptor at most once and shares the
//!   resulting `ResolvedService` read-only across threads.
//! - `RequestBuilder` is pure: metadata and arguments in, `ResolvedRequest`
//!   out. Nothing touches the network until the `Dispatcher` runs.
//! - Network I/O lives behind the `Transport` trait; `UreqTransport` is the
//!   bundled blocking implementation, and tests plug in fakes.
//! - `ServiceClient` is the only entry point callers need; every stage error
//!   surfaces as one `Error`.

pub mod adapter;
pub mod builder;
pub mod client;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod http;
pub mod interceptor;
pub mod metadata;
mod multipart;
pub mod resolver;
pub mod transport;

pub use adapter::ResponseAdapter;
pub use builder::RequestBuilder;
pub use client::{BoundService, ClientBuilder, ServiceClient};
pub use codec::{Codec, JsonCodec};
pub use config::ClientConfig;
pub use descriptor::{
    BindingKind, MethodDecl, ParamDecl, ReturnShape, ServiceDescriptor, ServiceId, ValueKind,
};
pub use dispatcher::{Dispatcher, Reply};
pub use error::{
    AdapterError, BindingError, CodecError, ConfigError, DecodeError, DescriptorError, Error,
    HttpStatusError, TransportError, Violation,
};
pub use handle::{AsyncHandle, HandleState};
pub use http::{Headers, HttpMethod, RawResponse, ResolvedRequest};
pub use interceptor::{Chain, Interceptor, LogLevel, LoggingInterceptor};
pub use metadata::{MethodDescriptor, ParameterBinding, PathTemplate, ResolvedService};
pub use resolver::Resolver;
pub use transport::{CallToken, Transport, UreqTransport};
