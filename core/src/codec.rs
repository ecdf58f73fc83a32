//! Body codecs used to encode request bodies and decode response payloads.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Converts values to and from wire bytes.
pub trait Codec: Send + Sync + 'static {
    /// `Content-Type` of bodies produced by `encode`.
    fn content_type(&self) -> &str;

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec backed by `serde_json`.
///
/// An empty payload decodes as `null`, so `()` and `Option<T>` targets accept
/// `204 No Content` answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let bytes = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null".as_slice()
        } else {
            bytes
        };
        serde_json::from_slice(bytes).map_err(|e| CodecError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        title: String,
    }

    #[test]
    fn encoded_value_decodes_back() {
        let item = Item {
            id: 7,
            title: "hello".to_string(),
        };
        let bytes = JsonCodec.encode(&item).unwrap();
        let back: Item = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn empty_payload_decodes_as_null() {
        let unit: () = JsonCodec.decode(b"").unwrap();
        assert_eq!(unit, ());
        let none: Option<Item> = JsonCodec.decode(b"  ").unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let err = JsonCodec.decode::<Vec<Item>>(br#"{"id":1}"#).unwrap_err();
        assert!(err.0.contains("expected a sequence"), "{err}");
    }
}
