//! Compression Codec Module
//!
//! zlib compression for stored payloads. Compression never aborts a write:
//! when the encoder fails, or when its output would not be smaller than the
//! input, the raw payload is stored with a ratio of 1.0.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{CacheError, Result};

/// Upper bound of deflate's expansion on decode (input bytes per output byte).
const MAX_ZLIB_RATIO: u64 = 1032;

// == Encoding ==
/// How a stored payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Zlib,
    Raw,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Zlib => "zlib",
            Encoding::Raw => "raw",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "zlib" => Ok(Encoding::Zlib),
            "raw" => Ok(Encoding::Raw),
            other => Err(CacheError::Corrupted(format!("Unknown encoding: {}", other))),
        }
    }
}

// == Compression Outcome ==
#[derive(Debug, Clone, PartialEq)]
pub enum CompressionOutcome {
    /// zlib output is smaller than the input
    Compressed,
    /// Encoder succeeded but saved nothing; raw bytes kept
    Incompressible,
    /// Encoder failed; raw bytes kept
    Failed(String),
}

// == Compressed ==
/// Result of a compression attempt.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub data: Vec<u8>,
    /// stored size / raw size, 1.0 when raw bytes are kept
    pub ratio: f64,
    pub encoding: Encoding,
    pub outcome: CompressionOutcome,
}

impl Compressed {
    fn raw(payload: &[u8], outcome: CompressionOutcome) -> Self {
        Self {
            data: payload.to_vec(),
            ratio: 1.0,
            encoding: Encoding::Raw,
            outcome,
        }
    }

    /// True when the encoder ran to completion.
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, CompressionOutcome::Failed(_))
    }

    /// The encoder failure, if any, as a cache error.
    pub fn error(&self) -> Option<CacheError> {
        match &self.outcome {
            CompressionOutcome::Failed(reason) => Some(CacheError::Compression(reason.clone())),
            _ => None,
        }
    }
}

// == Compression Codec ==
#[derive(Debug, Clone, Copy)]
pub struct CompressionCodec {
    level: u32,
}

impl CompressionCodec {
    /// Creates a codec at the given zlib level (0-9).
    pub fn new(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(CacheError::Validation(format!(
                "Compression level must be between 0 and 9, got {}",
                level
            )));
        }
        Ok(Self { level })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    // == Compress ==
    pub fn compress(&self, payload: &[u8]) -> Compressed {
        self.compress_with(payload, Vec::with_capacity(payload.len() / 2 + 16))
    }

    pub(crate) fn compress_with<W>(&self, payload: &[u8], sink: W) -> Compressed
    where
        W: Write + Into<Vec<u8>>,
    {
        let mut encoder = ZlibEncoder::new(sink, Compression::new(self.level));
        let encoded = encoder
            .write_all(payload)
            .and_then(|_| encoder.finish())
            .map(Into::into);

        match encoded {
            Ok(data) if data.len() < payload.len() => {
                let ratio = data.len() as f64 / payload.len() as f64;
                Compressed {
                    data,
                    ratio,
                    encoding: Encoding::Zlib,
                    outcome: CompressionOutcome::Compressed,
                }
            }
            Ok(_) => Compressed::raw(payload, CompressionOutcome::Incompressible),
            Err(e) => Compressed::raw(payload, CompressionOutcome::Failed(e.to_string())),
        }
    }

    // == Decompress ==
    /// Decodes a stored payload and checks it against the recorded raw size.
    pub fn decompress(&self, data: &[u8], encoding: Encoding, raw_size: u64) -> Result<Vec<u8>> {
        if !plausible_raw_size(encoding, data.len(), raw_size) {
            return Err(CacheError::Corrupted(format!(
                "Recorded size {} is impossible for {} stored {} bytes",
                raw_size,
                data.len(),
                encoding.as_str()
            )));
        }

        let payload = match encoding {
            Encoding::Raw => data.to_vec(),
            Encoding::Zlib => {
                let mut out = Vec::with_capacity(usize::try_from(raw_size).unwrap_or(0));
                ZlibDecoder::new(data)
                    .take(raw_size.saturating_add(1))
                    .read_to_end(&mut out)
                    .map_err(|e| CacheError::Corrupted(format!("zlib decode failed: {}", e)))?;
                out
            }
        };

        if payload.len() as u64 != raw_size {
            return Err(CacheError::Corrupted(format!(
                "Decoded {} bytes, expected {}",
                payload.len(),
                raw_size
            )));
        }
        Ok(payload)
    }
}

/// Whether `raw_size` bytes could have produced `stored_len` bytes in this
/// encoding. Raw payloads are stored verbatim; zlib cannot expand past
/// `MAX_ZLIB_RATIO` to one.
pub fn plausible_raw_size(encoding: Encoding, stored_len: usize, raw_size: u64) -> bool {
    let stored_len = stored_len as u64;
    match encoding {
        Encoding::Raw => raw_size == stored_len,
        Encoding::Zlib => raw_size <= stored_len.saturating_mul(MAX_ZLIB_RATIO),
    }
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self { level: 9 }
    }
}
