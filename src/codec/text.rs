//! Plain text codec.

use serde_json::Value;

use super::{Attributes, CodecError, PayloadCodec};

/// Attribute that carries the text body.
pub const MESSAGE_ATTRIBUTE: &str = "message";

/// Exposes a UTF-8 payload as a single `message` attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl PayloadCodec for TextCodec {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, payload: &[u8]) -> Result<Attributes, CodecError> {
        let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
        let mut attributes = Attributes::new();
        attributes.insert(MESSAGE_ATTRIBUTE.to_string(), Value::from(text));
        Ok(attributes)
    }

    fn encode(&self, attributes: &Attributes) -> Result<Vec<u8>, CodecError> {
        match attributes.get(MESSAGE_ATTRIBUTE) {
            Some(Value::String(text)) => Ok(text.as_bytes().to_vec()),
            Some(other) => Ok(other.to_string().into_bytes()),
            None => serde_json::to_vec(attributes).map_err(|e| CodecError::Encode(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wraps_text() {
        let attrs = TextCodec.decode(b"hello").unwrap();
        assert_eq!(attrs[MESSAGE_ATTRIBUTE], "hello");
    }

    #[test]
    fn test_encode_unwraps_message() {
        let attrs = TextCodec.decode(b"ok").unwrap();
        assert_eq!(TextCodec.encode(&attrs).unwrap(), b"ok");
    }

    #[test]
    fn test_encode_without_message_falls_back_to_json() {
        let mut attrs = Attributes::new();
        attrs.insert("count".to_string(), Value::from(3));
        assert_eq!(TextCodec.encode(&attrs).unwrap(), br#"{"count":3}"#);
    }
}
