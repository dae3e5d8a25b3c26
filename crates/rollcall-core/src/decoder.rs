//! Image decoding for captured faces.
//!
//! Browser captures arrive as base64 text, usually with a data-URI header
//! (`data:image/jpeg;base64,`). Everything up to the last comma is header.

use base64::{engine::general_purpose, Engine as _};
use image::ImageError;
use thiserror::Error;

use crate::types::FaceImage;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported or corrupt image encoding: {0}")]
    Image(#[from] ImageError),
    #[error("decoded image has no pixels")]
    NoPixels,
}

/// An encoded capture as it reaches the core.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Base64 text, optionally prefixed with a data-URI header.
    Base64(String),
    /// Raw container bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
}

impl ImageInput {
    pub fn decode(&self) -> Result<FaceImage, DecodeError> {
        match self {
            ImageInput::Base64(text) => decode_base64(text),
            ImageInput::Bytes(bytes) => decode_bytes(bytes),
        }
    }
}

/// Remove a data-URI header, if any.
pub fn strip_data_uri(text: &str) -> &str {
    match text.rfind(',') {
        Some(idx) => &text[idx + 1..],
        None => text,
    }
}

/// Decode base64 image text into an RGB frame.
pub fn decode_base64(text: &str) -> Result<FaceImage, DecodeError> {
    // Encoders commonly wrap at 76 columns.
    let payload: Vec<u8> = strip_data_uri(text)
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = general_purpose::STANDARD.decode(&payload)?;
    decode_bytes(&bytes)
}

/// Decode container bytes into an RGB frame.
pub fn decode_bytes(bytes: &[u8]) -> Result<FaceImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let decoded = image::load_from_memory(bytes)?;
    let rgb = decoded.to_rgb8();
    tracing::trace!(width = rgb.width(), height = rgb.height(), "decoded image");
    FaceImage::from_rgb(rgb).ok_or(DecodeError::NoPixels)
}
