//! Caller-facing façade over the resolve, build, dispatch and adapt stages.
//!
//! # Design
//! `ServiceClient` owns the configuration, the shared resolver, the
//! dispatcher and the codec. Binding a `ServiceDescriptor` resolves it once
//! (through the resolver cache) and yields a `BoundService`, which invokes
//! methods by name with positional arguments. Every stage error is converted
//! into the single `Error` type before it reaches the caller.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::adapter::ResponseAdapter;
use crate::builder::RequestBuilder;
use crate::codec::{Codec, JsonCodec};
use crate::config::ClientConfig;
use crate::descriptor::{ReturnShape, ServiceDescriptor};
use crate::dispatcher::{Dispatcher, Reply};
use crate::error::{BindingError, ConfigError, DescriptorError, Error};
use crate::handle::AsyncHandle;
use crate::http::ResolvedRequest;
use crate::interceptor::Interceptor;
use crate::metadata::{MethodDescriptor, ResolvedService};
use crate::resolver::Resolver;
use crate::transport::{Transport, UreqTransport};

/// Invokes declared methods of any service descriptor.
pub struct ServiceClient<C: Codec = JsonCodec> {
    config: Arc<ClientConfig>,
    resolver: Arc<Resolver>,
    dispatcher: Dispatcher,
    adapter: ResponseAdapter<C>,
    codec: Arc<C>,
}

impl<C: Codec> Clone for ServiceClient<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            resolver: Arc::clone(&self.resolver),
            dispatcher: self.dispatcher.clone(),
            adapter: self.adapter.clone(),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl ServiceClient<JsonCodec> {
    /// A JSON client over `UreqTransport` with default configuration.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Self::builder().config(ClientConfig::new(api_url)).build()
    }

    pub fn builder() -> ClientBuilder<JsonCodec> {
        ClientBuilder::new()
    }
}

impl<C: Codec> ServiceClient<C> {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Resolve `descriptor` and bind it to this client.
    pub fn bind(&self, descriptor: &ServiceDescriptor) -> Result<BoundService<C>, DescriptorError> {
        let service = self.resolver.resolve(descriptor)?;
        Ok(BoundService {
            client: self.clone(),
            service,
        })
    }

    /// Invoke `method` of `descriptor` in its declared return shape.
    pub fn invoke<T>(
        &self,
        descriptor: &ServiceDescriptor,
        method: &str,
        args: &[Value],
    ) -> Result<Reply<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.bind(descriptor)?.invoke(method, args)
    }

    /// Invoke a synchronous method and return its decoded value.
    pub fn call<T>(&self, descriptor: &ServiceDescriptor, method: &str, args: &[Value]) -> Result<T, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.bind(descriptor)?.call(method, args)
    }

    /// Invoke an asynchronous method and return its handle.
    pub fn call_async<T>(
        &self,
        descriptor: &ServiceDescriptor,
        method: &str,
        args: &[Value],
    ) -> Result<AsyncHandle<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.bind(descriptor)?.call_async(method, args)
    }
}

/// A resolved service bound to the client that will call it.
pub struct BoundService<C: Codec = JsonCodec> {
    client: ServiceClient<C>,
    service: Arc<ResolvedService>,
}

impl<C: Codec> Clone for BoundService<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            service: Arc::clone(&self.service),
        }
    }
}

impl<C: Codec> BoundService<C> {
    pub fn service(&self) -> &ResolvedService {
        &self.service
    }

    /// Invoke `method` with positional `args`.
    ///
    /// Synchronous methods block until the value is decoded. Asynchronous
    /// methods return a pending handle at once; if their arguments cannot be
    /// bound the handle is already `Failed`.
    pub fn invoke<T>(&self, method: &str, args: &[Value]) -> Result<Reply<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let method = self.method(method)?;
        debug!(
            service = %self.service.name(),
            method = %method.name,
            returns = method.returns.as_str(),
            "invoking"
        );

        let request = match self.build(method, args) {
            Ok(request) => request,
            Err(err) if method.returns == ReturnShape::Async => {
                return Ok(Reply::Pending(AsyncHandle::failed(err.into())));
            }
            Err(err) => return Err(err.into()),
        };

        let adapter = self.client.adapter.clone();
        self.client
            .dispatcher
            .dispatch(request, method.returns, move |response| {
                adapter.adapt::<T>(response).map_err(Error::from)
            })
    }

    /// Invoke a method declared `Sync`.
    pub fn call<T>(&self, method: &str, args: &[Value]) -> Result<T, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.expect_shape(method, ReturnShape::Sync)?;
        match self.invoke(method, args)? {
            Reply::Ready(value) => Ok(value),
            Reply::Pending(handle) => handle.wait(),
        }
    }

    /// Invoke a method declared `Async`.
    pub fn call_async<T>(&self, method: &str, args: &[Value]) -> Result<AsyncHandle<T>, Error>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.expect_shape(method, ReturnShape::Async)?;
        match self.invoke(method, args)? {
            Reply::Pending(handle) => Ok(handle),
            Reply::Ready(_) => Err(self.shape_error(method, ReturnShape::Sync)),
        }
    }

    fn method(&self, name: &str) -> Result<&MethodDescriptor, BindingError> {
        self.service
            .method(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| BindingError::UnknownMethod {
                service: self.service.name().to_string(),
                method: name.to_string(),
            })
    }

    fn build(
        &self,
        method: &MethodDescriptor,
        args: &[Value],
    ) -> Result<ResolvedRequest, BindingError> {
        let codec = self.client.codec.as_ref();
        RequestBuilder::new(self.client.config.api_url.as_deref(), codec).build(method, args)
    }

    fn expect_shape(&self, name: &str, wanted: ReturnShape) -> Result<(), Error> {
        let declared = self.method(name)?.returns;
        if declared != wanted {
            return Err(self.shape_error(name, declared));
        }
        Ok(())
    }

    fn shape_error(&self, name: &str, declared: ReturnShape) -> Error {
        BindingError::ReturnShape {
            method: name.to_string(),
            declared: declared.as_str(),
        }
        .into()
    }
}

/// Assembles a `ServiceClient`.
pub struct ClientBuilder<C = JsonCodec> {
    config: ClientConfig,
    resolver: Option<Arc<Resolver>>,
    transport: Option<Arc<dyn Transport>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    codec: C,
}

impl ClientBuilder<JsonCodec> {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            resolver: None,
            transport: None,
            interceptors: Vec::new(),
            codec: JsonCodec,
        }
    }
}

impl Default for ClientBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> ClientBuilder<C> {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `resolver` instead of the process-wide one.
    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Append an interceptor; interceptors run in the order added.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn codec<D: Codec>(self, codec: D) -> ClientBuilder<D> {
        ClientBuilder {
            config: self.config,
            resolver: self.resolver,
            transport: self.transport,
            interceptors: self.interceptors,
            codec,
        }
    }

    pub fn build(self) -> Result<ServiceClient<C>, ConfigError> {
        self.config.validate()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(UreqTransport::new()));
        let dispatcher = Dispatcher::new(
            transport,
            self.interceptors,
            self.config.timeout(),
            &self.config.user_agent,
        );
        let codec = Arc::new(self.codec);
        Ok(ServiceClient {
            config: Arc::new(self.config),
            resolver: self.resolver.unwrap_or_else(Resolver::global),
            dispatcher,
            adapter: ResponseAdapter::new(Arc::clone(&codec)),
            codec,
        })
    }
}
