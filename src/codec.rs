use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};

use crate::payload::AttestationPayload;

/// Canonical payload compressed with raw DEFLATE.
///
/// The same transform feeds both the remote and the local renderer, and is
/// advertised to the backend as [`CompressedBlob::TRANSFORM`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedBlob(Vec<u8>);

impl CompressedBlob {
    /// Identifier of the compression transform (RFC 1951, no zlib/gzip framing).
    pub const TRANSFORM: &'static str = "deflate-raw";

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Standard padded base64, used whenever the blob crosses a text boundary.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| anyhow!("Compressed blob is not valid base64: {e}"))?;
        Ok(Self(bytes))
    }
}

/// Canonicalizes the payload and compresses it.
///
/// Identical payloads always produce byte-identical blobs.
pub fn compress(payload: &AttestationPayload) -> Result<CompressedBlob> {
    let canonical = payload.canonical_string()?;
    compress_str(&canonical)
}

/// Compresses an already canonical string.
pub fn compress_str(canonical: &str) -> Result<CompressedBlob> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(canonical.as_bytes())
        .context("Failed to deflate payload")?;
    let bytes = encoder.finish().context("Failed to finish deflate stream")?;

    log::trace!(
        "Compressed {} bytes to {} bytes",
        canonical.len(),
        bytes.len()
    );

    Ok(CompressedBlob(bytes))
}

/// Inverse of [`compress`]: yields the exact canonical string that was compressed.
pub fn decompress(blob: &CompressedBlob) -> Result<String> {
    let mut decoder = DeflateDecoder::new(blob.as_bytes());
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .context("Failed to inflate compressed blob")?;

    let canonical = String::from_utf8(inflated)
        .map_err(|e| anyhow!("Inflated blob is not valid UTF-8: {e}"))?;
    Ok(canonical)
}
