//! Six-bits-per-character text encoding for exchange buffers.
//!
//! The alphabet is standard base64 without padding. A text of `n` characters
//! carries `ceil(n * 6 / 8)` bytes of declared capacity; a buffer of `m` bytes
//! encodes to `ceil(m * 8 / 6)` characters.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use thiserror::Error;

const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Errors raised while decoding an exchange buffer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text is not valid for the six-bit alphabet.
    #[error("invalid buffer encoding: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The buffer does not fit the 16-bit declared length.
    #[error("buffer of {length} bytes exceeds the {max} byte limit")]
    TooLarge {
        /// Declared length of the offending buffer.
        length: usize,
        /// Largest declarable length.
        max: usize,
    },
}

/// Bytes of capacity declared by a text of `encoded_len` characters.
#[must_use]
pub const fn decoded_capacity(encoded_len: usize) -> usize {
    (encoded_len * 6).div_ceil(8)
}

/// Characters needed to encode `raw_len` bytes.
#[must_use]
pub const fn encoded_len(raw_len: usize) -> usize {
    (raw_len * 8).div_ceil(6)
}

/// Encodes raw bytes as text.
#[must_use]
pub fn encode(raw: &[u8]) -> String {
    ENGINE.encode(raw)
}

/// Decodes text into at most `length` bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the text contains characters outside
/// the alphabet or has an impossible length.
pub fn decode(text: &str, length: usize) -> Result<Vec<u8>, CodecError> {
    let mut raw = ENGINE.decode(text)?;
    raw.truncate(length);
    Ok(raw)
}

/// Per-call buffer holding both representations and the declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeBuffer {
    text: String,
    raw: Vec<u8>,
    declared_length: u16,
}

impl ExchangeBuffer {
    /// Decodes a buffer received as text.
    ///
    /// The declared length is the capacity implied by the text length.
    ///
    /// # Errors
    ///
    /// Returns an error when the text does not decode or declares more than
    /// `u16::MAX` bytes.
    pub fn from_text(text: impl Into<String>) -> Result<Self, CodecError> {
        let text = text.into();
        let capacity = decoded_capacity(text.len());
        let declared_length = declared(capacity)?;
        let raw = decode(&text, capacity)?;
        Ok(Self {
            text,
            raw,
            declared_length,
        })
    }

    /// Wraps raw bytes produced by the channel.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooLarge`] when the bytes do not fit a 16-bit
    /// length.
    pub fn from_raw(raw: Vec<u8>) -> Result<Self, CodecError> {
        let declared_length = declared(raw.len())?;
        Ok(Self {
            text: encode(&raw),
            raw,
            declared_length,
        })
    }

    /// Textual representation.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Raw bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Length declared for the buffer.
    #[must_use]
    pub const fn declared_length(&self) -> u16 {
        self.declared_length
    }

    /// Consumes the buffer, returning its text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

fn declared(length: usize) -> Result<u16, CodecError> {
    u16::try_from(length).map_err(|_| CodecError::TooLarge {
        length,
        max: usize::from(u16::MAX),
    })
}
