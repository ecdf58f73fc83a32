//! Executes built requests synchronously or in the background.
//!
//! # Design
//! Synchronous calls run the interceptor chain and transport on the caller's
//! thread; the per-call timeout is handed to the transport, which bounds the
//! round trip. Asynchronous calls return an `AsyncHandle` immediately and
//! run on a dedicated thread; the response is adapted there and delivered
//! through the handle. Cancelling the handle marks the call token cancelled
//! and asks the transport to abort.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::descriptor::ReturnShape;
use crate::error::{Error, TransportError};
use crate::handle::AsyncHandle;
use crate::http::{RawResponse, ResolvedRequest};
use crate::interceptor::{Chain, Interceptor};
use crate::transport::{CallToken, Transport};

/// A method's outcome in its declared return shape.
#[derive(Debug)]
pub enum Reply<T> {
    Ready(T),
    Pending(AsyncHandle<T>),
}

impl<T> Reply<T> {
    /// The value of a synchronous reply, or waits for an asynchronous one.
    pub fn into_value(self) -> Result<T, Error> {
        match self {
            Reply::Ready(value) => Ok(value),
            Reply::Pending(handle) => handle.wait(),
        }
    }

    pub fn into_handle(self) -> Option<AsyncHandle<T>> {
        match self {
            Reply::Ready(_) => None,
            Reply::Pending(handle) => Some(handle),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    timeout: Option<Duration>,
    user_agent: Arc<str>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        timeout: Option<Duration>,
        user_agent: &str,
    ) -> Self {
        Self {
            transport,
            interceptors: interceptors.into(),
            timeout,
            user_agent: user_agent.into(),
        }
    }

    /// Run `request` through the interceptors and the transport.
    pub fn execute(
        &self,
        request: ResolvedRequest,
        token: &CallToken,
    ) -> Result<RawResponse, TransportError> {
        let chain = Chain::new(
            &self.interceptors,
            self.transport.as_ref(),
            self.timeout,
            token,
            &self.user_agent,
        );
        chain.proceed(request).inspect_err(|err| {
            warn!(call = %token.id(), error = %err, "transport failed");
        })
    }

    /// Dispatch according to `shape`, adapting the response with `adapt`.
    pub fn dispatch<T, F>(
        &self,
        request: ResolvedRequest,
        shape: ReturnShape,
        adapt: F,
    ) -> Result<Reply<T>, Error>
    where
        T: Send + 'static,
        F: FnOnce(RawResponse) -> Result<T, Error> + Send + 'static,
    {
        match shape {
            ReturnShape::Sync => self.call(request, adapt).map(Reply::Ready),
            ReturnShape::Async => Ok(Reply::Pending(self.spawn(request, adapt))),
        }
    }

    /// Blocking dispatch on the calling thread.
    pub fn call<T, F>(&self, request: ResolvedRequest, adapt: F) -> Result<T, Error>
    where
        F: FnOnce(RawResponse) -> Result<T, Error>,
    {
        let token = CallToken::new();
        let response = self.execute(request, &token)?;
        adapt(response)
    }

    /// Background dispatch; the handle settles exactly once.
    pub fn spawn<T, F>(&self, request: ResolvedRequest, adapt: F) -> AsyncHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(RawResponse) -> Result<T, Error> + Send + 'static,
    {
        let handle = AsyncHandle::pending();
        let token = CallToken::new();

        let transport = Arc::clone(&self.transport);
        let abort = token.clone();
        handle.on_cancel(move || {
            debug!(call = %abort.id(), "cancelling call");
            abort.cancel();
            transport.cancel(&abort);
        });

        let dispatcher = self.clone();
        let worker = handle.clone();
        let call = token.id();
        let spawned = thread::Builder::new()
            .name("declhttp-call".to_string())
            .spawn(move || {
                let outcome = dispatcher
                    .execute(request, &token)
                    .map_err(Error::from)
                    .and_then(|response| {
                        if worker.is_cancelled() {
                            return Err(Error::Cancelled);
                        }
                        adapt(response)
                    });
                if !worker.complete(outcome) {
                    debug!(call = %token.id(), "call settled before completion, outcome dropped");
                }
            });

        if let Err(err) = spawned {
            warn!(%call, error = %err, "could not spawn call thread");
            handle.complete(Err(TransportError::Spawn(err.to_string()).into()));
        }
        handle
    }
}
