//! Turns a `RawResponse` into the method's declared value.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::codec::Codec;
use crate::error::{AdapterError, DecodeError, HttpStatusError};
use crate::http::RawResponse;

/// Maps status codes to outcomes and decodes 2xx payloads with the codec.
#[derive(Debug)]
pub struct ResponseAdapter<C> {
    codec: Arc<C>,
}

impl<C> Clone for ResponseAdapter<C> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<C: Codec> ResponseAdapter<C> {
    pub fn new(codec: Arc<C>) -> Self {
        Self { codec }
    }

    /// Decode a 2xx payload into `T`. Any other status is an
    /// `HttpStatusError` carrying the raw payload; no decode is attempted.
    pub fn adapt<T: DeserializeOwned>(&self, response: RawResponse) -> Result<T, AdapterError> {
        if !response.is_success() {
            return Err(HttpStatusError {
                status: response.status,
                body: response.body,
            }
            .into());
        }
        self.codec.decode(&response.body).map_err(|e| {
            DecodeError {
                status: response.status,
                reason: e.0,
            }
            .into()
        })
    }
}
