//! Payload codecs.
//!
//! An endpoint turns opaque payloads into structured attributes with a
//! [`PayloadCodec`] selected by configuration. Malformed input is reported as
//! a [`CodecError`], never coerced into a fallback value.

mod json;
mod text;

pub use json::JsonCodec;
pub use text::TextCodec;

use std::sync::Arc;

use serde::Deserialize;

/// Decoded event attributes.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Errors produced while decoding or encoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("failed to encode attributes: {0}")]
    Encode(String),
}

/// Pluggable decode/encode capability.
pub trait PayloadCodec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Decode raw payload bytes into attributes.
    fn decode(&self, payload: &[u8]) -> Result<Attributes, CodecError>;

    /// Encode attributes back into payload bytes.
    fn encode(&self, attributes: &Attributes) -> Result<Vec<u8>, CodecError>;
}

/// Codec selector used in endpoint and sink configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    /// JSON object payloads.
    #[default]
    Json,
    /// Plain UTF-8 text, exposed as a single `message` attribute.
    Text,
}

impl CodecType {
    /// Build the codec instance for this selector.
    pub fn build(self) -> Arc<dyn PayloadCodec> {
        match self {
            CodecType::Json => Arc::new(JsonCodec),
            CodecType::Text => Arc::new(TextCodec),
        }
    }
}
