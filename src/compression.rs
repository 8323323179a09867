//! Body compression: algorithm detection and whole-buffer (de)compression.
//!
//! Detection never fails: unknown `Content-Encoding` tokens and bodies
//! without a recognizable signature simply yield `None`. Compression and
//! decompression return [`CompressionError`] and leave it to the caller to
//! decide whether that is fatal.

use std::fmt;
use std::io::{Read, Write};

use brotli::{CompressorWriter, Decompressor};
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use thiserror::Error;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_WINDOW: u32 = 22;
const BROTLI_DEFAULT_QUALITY: u32 = 11;
const ZSTD_DEFAULT_LEVEL: i32 = 3;

// Content codings this crate can produce and undo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl CompressionAlgorithm {
    /// Token written to `Content-Encoding`
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Brotli => "br",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("{algorithm} encoding failed: {source}")]
    Encode {
        algorithm: CompressionAlgorithm,
        source: std::io::Error,
    },

    #[error("{algorithm} decoding failed: {source}")]
    Decode {
        algorithm: CompressionAlgorithm,
        source: std::io::Error,
    },
}

/// Map a `Content-Encoding` value to an algorithm.
///
/// `identity`, empty and unknown tokens all mean no compression.
pub fn detect(content_encoding: &str) -> Option<CompressionAlgorithm> {
    match content_encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => Some(CompressionAlgorithm::Gzip),
        "deflate" | "x-deflate" => Some(CompressionAlgorithm::Deflate),
        "br" | "brotli" => Some(CompressionAlgorithm::Brotli),
        "zstd" | "zstandard" => Some(CompressionAlgorithm::Zstd),
        _ => None,
    }
}

/// Guess the algorithm from the leading bytes of a body.
///
/// Brotli streams carry no signature and are never detected this way.
pub fn detect_by_magic_bytes(data: &[u8]) -> Option<CompressionAlgorithm> {
    match data {
        [0x1f, 0x8b, ..] => Some(CompressionAlgorithm::Gzip),
        [0x28, 0xb5, 0x2f, 0xfd, ..] => Some(CompressionAlgorithm::Zstd),
        // zlib header: deflate method, checksum over the first two bytes
        [0x78, flags, ..] if matches!(flags, 0x01 | 0x5e | 0x9c | 0xda) => {
            Some(CompressionAlgorithm::Deflate)
        }
        _ => None,
    }
}

/// Compress with the default level of each algorithm.
pub fn compress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
) -> Result<Vec<u8>, CompressionError> {
    compress_with_level(data, algorithm, None)
}

/// Compress with an explicit level. Levels are clamped to what each encoder accepts.
pub fn compress_with_level(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: Option<u32>,
) -> Result<Vec<u8>, CompressionError> {
    let encode_err = |source| CompressionError::Encode { algorithm, source };

    match algorithm {
        CompressionAlgorithm::Gzip => {
            let mut e = GzEncoder::new(Vec::new(), flate2_level(level));
            e.write_all(data).map_err(encode_err)?;
            e.finish().map_err(encode_err)
        }
        CompressionAlgorithm::Deflate => {
            let mut e = ZlibEncoder::new(Vec::new(), flate2_level(level));
            e.write_all(data).map_err(encode_err)?;
            e.finish().map_err(encode_err)
        }
        CompressionAlgorithm::Brotli => {
            let quality = level.unwrap_or(BROTLI_DEFAULT_QUALITY).min(11);
            let mut e =
                CompressorWriter::new(Vec::new(), BROTLI_BUFFER_SIZE, quality, BROTLI_WINDOW);
            e.write_all(data).map_err(encode_err)?;
            e.flush().map_err(encode_err)?;
            Ok(e.into_inner())
        }
        CompressionAlgorithm::Zstd => {
            let level = level.map_or(ZSTD_DEFAULT_LEVEL, |l| l.min(22) as i32);
            zstd::stream::encode_all(data, level).map_err(encode_err)
        }
    }
}

fn flate2_level(level: Option<u32>) -> Compression {
    level.map_or(Compression::default(), |l| Compression::new(l.min(9)))
}

/// Decompress a whole body.
///
/// `deflate` bodies are tried as zlib first and as raw deflate second,
/// since servers send both under the same token.
pub fn decompress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
) -> Result<Vec<u8>, CompressionError> {
    let decode_err = |source| CompressionError::Decode { algorithm, source };
    let mut out = Vec::new();

    match algorithm {
        CompressionAlgorithm::Gzip => {
            GzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(decode_err)?;
        }
        CompressionAlgorithm::Deflate => {
            if ZlibDecoder::new(data).read_to_end(&mut out).is_err() {
                out.clear();
                DeflateDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(decode_err)?;
            }
        }
        CompressionAlgorithm::Brotli => {
            Decompressor::new(data, BROTLI_BUFFER_SIZE)
                .read_to_end(&mut out)
                .map_err(decode_err)?;
        }
        CompressionAlgorithm::Zstd => {
            out = zstd::stream::decode_all(data).map_err(decode_err)?;
        }
    }

    Ok(out)
}
