//! JSON object codec.

use serde_json::Value;

use super::{Attributes, CodecError, PayloadCodec};

/// Wrapper key accepted around the attribute object (`{"event": {...}}`).
const EVENT_WRAPPER_KEY: &str = "event";

/// Decodes JSON objects into attributes.
///
/// Both bare objects (`{"message": "hi"}`) and the wrapped form
/// (`{"event": {"message": "hi"}}`) are accepted. Anything that is not an
/// object is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, payload: &[u8]) -> Result<Attributes, CodecError> {
        let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;

        let mut object = match value {
            Value::Object(object) => object,
            _ => return Err(CodecError::NotAnObject),
        };

        let wrapped = object.len() == 1
            && matches!(object.get(EVENT_WRAPPER_KEY), Some(Value::Object(_)));
        if wrapped {
            if let Some(Value::Object(inner)) = object.remove(EVENT_WRAPPER_KEY) {
                return Ok(inner);
            }
        }
        Ok(object)
    }

    fn encode(&self, attributes: &Attributes) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(attributes).map_err(|e| CodecError::Encode(e.to_string()))
    }
}
