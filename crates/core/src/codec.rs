//! Base64 codec used for site-key values.
//!
//! Keys published in filter rules are stripped of their `=` padding while header and
//! attribute values usually keep it, so decoding accepts both forms.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

/// Encodes and decodes base64 text.
pub trait Base64Codec: Send + Sync {
    /// Decode base64 text into raw bytes.
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, base64::DecodeError>;

    /// Encode raw bytes as padded base64 text.
    fn encode(&self, bytes: &[u8]) -> String;
}

const PADDING_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Standard-alphabet codec, tolerant of missing padding on decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBase64;

impl Base64Codec for StandardBase64 {
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
        PADDING_INDIFFERENT.decode(encoded.trim())
    }

    fn encode(&self, bytes: &[u8]) -> String {
        PADDING_INDIFFERENT.encode(bytes)
    }
}
