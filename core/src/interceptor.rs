//! Interceptor chain wrapped around the transport.
//!
//! Interceptors are the extension point for cross-cutting policy such as
//! authentication, retries or logging. Each one receives the request and a
//! `Chain`; calling `Chain::proceed` hands a request to the next link, and
//! the last link sends it through the transport. An interceptor may also
//! answer without proceeding, or proceed more than once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::http::{Headers, RawResponse, ResolvedRequest};
use crate::transport::{CallToken, Transport};

pub trait Interceptor: Send + Sync {
    fn intercept(
        &self,
        request: ResolvedRequest,
        chain: &Chain<'_>,
    ) -> Result<RawResponse, TransportError>;
}

/// The remaining links of one call.
#[derive(Clone, Copy)]
pub struct Chain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
    timeout: Option<Duration>,
    token: &'a CallToken,
    user_agent: &'a str,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(
        interceptors: &'a [Arc<dyn Interceptor>],
        transport: &'a dyn Transport,
        timeout: Option<Duration>,
        token: &'a CallToken,
        user_agent: &'a str,
    ) -> Self {
        Self {
            interceptors,
            transport,
            timeout,
            token,
            user_agent,
        }
    }

    pub fn proceed(&self, request: ResolvedRequest) -> Result<RawResponse, TransportError> {
        match self.interceptors.split_first() {
            Some((first, rest)) => first.intercept(
                request,
                &Chain {
                    interceptors: rest,
                    ..*self
                },
            ),
            None => self.send(request),
        }
    }

    pub fn token(&self) -> &CallToken {
        self.token
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn send(&self, mut request: ResolvedRequest) -> Result<RawResponse, TransportError> {
        if self.token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        if !request.headers.contains("User-Agent") {
            request.headers.set("User-Agent", self.user_agent);
        }
        debug!(call = %self.token.id(), verb = %request.method, url = %request.url, "sending request");
        self.transport.send(&request, self.timeout, self.token)
    }
}

/// How much of each exchange `LoggingInterceptor` records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    None,
    /// Request line and response status with timing.
    #[default]
    Basic,
    /// Basic plus headers.
    Headers,
    /// Headers plus bodies.
    Body,
}

/// Records each exchange through `tracing`.
///
/// Headers and bodies may carry credentials; keep the level at `Basic` or
/// below outside development.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor {
    level: LogLevel,
}

impl LoggingInterceptor {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    fn headers(&self, headers: &Headers) -> String {
        headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn body(bytes: &[u8]) -> String {
        const LIMIT: usize = 4096;
        let shown = &bytes[..bytes.len().min(LIMIT)];
        let mut text = String::from_utf8_lossy(shown).into_owned();
        if bytes.len() > LIMIT {
            text.push_str("...");
        }
        text
    }
}

impl Interceptor for LoggingInterceptor {
    fn intercept(
        &self,
        request: ResolvedRequest,
        chain: &Chain<'_>,
    ) -> Result<RawResponse, TransportError> {
        if self.level == LogLevel::None {
            return chain.proceed(request);
        }

        let call = chain.token().id();
        let (verb, url) = (request.method, request.url.clone());
        info!(%call, %verb, %url, body_len = request.body_len(), "--> request");
        if self.level >= LogLevel::Headers {
            info!(%call, headers = %self.headers(&request.headers), "--> headers");
        }
        if self.level >= LogLevel::Body {
            if let Some(body) = &request.body {
                info!(%call, body = %Self::body(body), "--> body");
            }
        }

        let started = Instant::now();
        let response = chain.proceed(request).inspect_err(|err| {
            warn!(%call, %verb, %url, error = %err, "<-- request failed");
        })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            %call,
            %verb,
            %url,
            status = response.status,
            elapsed_ms,
            body_len = response.body.len(),
            "<-- response"
        );
        if self.level >= LogLevel::Headers {
            info!(%call, headers = %self.headers(&response.headers), "<-- headers");
        }
        if self.level >= LogLevel::Body {
            info!(%call, body = %Self::body(&response.body), "<-- body");
        }
        Ok(response)
    }
}
