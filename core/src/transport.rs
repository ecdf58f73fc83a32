//! The network seam: a `Transport` executes one `ResolvedRequest`.
//!
//! # Design
//! The engine never touches sockets itself. A transport receives a frozen
//! request, the per-call timeout and a `CallToken` identifying the call, and
//! answers with a `RawResponse` whatever the status code; status
//! interpretation belongs to the response adapter.
//!
//! `UreqTransport` is the bundled blocking implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;
use crate::http::{Headers, HttpMethod, RawResponse, ResolvedRequest};

/// Opaque identity of one in-flight call, shared with whoever may cancel it.
#[derive(Debug, Clone)]
pub struct CallToken {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl CallToken {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CallToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs the actual network I/O for a request.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Option<Duration>,
        token: &CallToken,
    ) -> Result<RawResponse, TransportError>;

    /// Best-effort abort of the call identified by `token`. The token is
    /// already marked cancelled when this runs.
    fn cancel(&self, token: &CallToken) {
        let _ = token;
    }
}

/// Blocking transport backed by a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply timeout and headers to a ureq request of either body flavour.
fn prepare<B>(
    builder: ureq::RequestBuilder<B>,
    request: &ResolvedRequest,
    timeout: Option<Duration>,
) -> ureq::RequestBuilder<B> {
    let mut builder = builder.config().timeout_global(timeout).build();
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

fn map_error(err: ureq::Error, timeout: Option<Duration>) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout(timeout.unwrap_or_default()),
        ureq::Error::HostNotFound => TransportError::Connect("host not found".to_string()),
        ureq::Error::ConnectionFailed => TransportError::Connect("connection failed".to_string()),
        ureq::Error::Io(e) => TransportError::Io(e.to_string()),
        other => TransportError::Other(other.to_string()),
    }
}

impl Transport for UreqTransport {
    fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Option<Duration>,
        token: &CallToken,
    ) -> Result<RawResponse, TransportError> {
        if token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let url = request.url.as_str();
        let body = request.body.as_deref().unwrap_or_default();
        let result = match request.method {
            HttpMethod::Get => prepare(self.agent.get(url), request, timeout).call(),
            HttpMethod::Delete => prepare(self.agent.delete(url), request, timeout).call(),
            HttpMethod::Head => prepare(self.agent.head(url), request, timeout).call(),
            HttpMethod::Options => prepare(self.agent.options(url), request, timeout).call(),
            HttpMethod::Post => prepare(self.agent.post(url), request, timeout).send(body),
            HttpMethod::Put => prepare(self.agent.put(url), request, timeout).send(body),
            HttpMethod::Patch => prepare(self.agent.patch(url), request, timeout).send(body),
        };
        let mut response = result.map_err(|e| map_error(e, timeout))?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| map_error(e, timeout))?;

        if token.is_cancelled() {
            debug!(call = %token.id(), "discarding response of cancelled call");
            return Err(TransportError::Cancelled);
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
