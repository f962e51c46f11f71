//! Compressed base64 payloads.
//!
//! Mod tooling shares small structured blobs (manipulation lists, body
//! profiles) as `base64(gzip(version_byte ++ body))`. Some producers skip the
//! gzip layer, so decoding accepts both forms.

use base64::Engine;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("payload is empty")]
    Empty,
}

/// A decoded payload: leading version byte plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPayload {
    pub version: u8,
    pub body: Vec<u8>,
}

pub fn decode(text: &str) -> Result<VersionedPayload, PayloadError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = base64::engine::general_purpose::STANDARD.decode(cleaned)?;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        out
    } else {
        raw
    };
    let (&version, body) = bytes.split_first().ok_or(PayloadError::Empty)?;
    Ok(VersionedPayload {
        version,
        body: body.to_vec(),
    })
}

pub fn encode(version: u8, body: &[u8]) -> Result<String, PayloadError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[version])?;
    encoder.write_all(body)?;
    let compressed = encoder.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_keeps_version() {
        let text = encode(4, br#"{"Bones":{}}"#).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.version, 4);
        assert_eq!(decoded.body, br#"{"Bones":{}}"#);
    }

    #[test]
    fn decode_accepts_uncompressed_form() {
        let mut raw = vec![0u8];
        raw.extend_from_slice(b"[]");
        let text = base64::engine::general_purpose::STANDARD.encode(raw);
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.version, 0);
        assert_eq!(decoded.body, b"[]");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("!!not base64!!"), Err(PayloadError::Base64(_))));
        assert!(matches!(decode(""), Err(PayloadError::Empty)));
    }
}
