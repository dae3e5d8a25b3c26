//! Stored signature encoding.
//!
//! Layout (little-endian):
//! ```text
//! [0]      format version (1)
//! [1..5]   dimension n as u32
//! [5..]    n × f32
//! ```
//! Floats are stored as raw IEEE-754 bits so a decode is bit-exact.

use thiserror::Error;

use crate::types::FaceSignature;

pub const SIGNATURE_FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureCodecError {
    #[error("signature blob too short: {0} bytes")]
    Truncated(usize),
    #[error("unsupported signature format version {0}")]
    UnsupportedVersion(u8),
    #[error("signature has zero dimensions")]
    EmptySignature,
    #[error("signature blob length mismatch: header declares {dimension} values ({expected} bytes), got {actual} bytes")]
    LengthMismatch {
        dimension: usize,
        expected: usize,
        actual: usize,
    },
    #[error("signature value {index} is not finite")]
    NonFinite { index: usize },
}

pub fn encode_signature(signature: &FaceSignature) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + signature.values.len() * 4);
    out.push(SIGNATURE_FORMAT_VERSION);
    out.extend_from_slice(&(signature.values.len() as u32).to_le_bytes());
    for value in &signature.values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_signature(bytes: &[u8]) -> Result<FaceSignature, SignatureCodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(SignatureCodecError::Truncated(bytes.len()));
    }
    if bytes[0] != SIGNATURE_FORMAT_VERSION {
        return Err(SignatureCodecError::UnsupportedVersion(bytes[0]));
    }

    let dimension = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if dimension == 0 {
        return Err(SignatureCodecError::EmptySignature);
    }
    let expected = HEADER_LEN + dimension * 4;
    if bytes.len() != expected {
        return Err(SignatureCodecError::LengthMismatch {
            dimension,
            expected,
            actual: bytes.len(),
        });
    }

    let values: Vec<f32> = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(SignatureCodecError::NonFinite { index });
    }
    Ok(FaceSignature::new(values))
}
