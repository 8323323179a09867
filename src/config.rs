//! Parse and transcode settings.
//!
//! Settings are plain values handed to each operation; nothing here is
//! global. Both structures can be read from TOML, missing keys falling back
//! to their defaults:
//!
//! ```toml
//! compression = "gzip"
//! chunked = { apply = 4096 }
//! style = "http11"
//! line_separator = "crlf"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::compression::CompressionAlgorithm;
use crate::http::LineEnding;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to deserialize config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Options applied while parsing a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    /// Decode chunked bodies right away instead of keeping the wire form
    pub auto_decode_chunked: bool,

    /// Append decoded trailers to the headers (only with `auto_decode_chunked`)
    pub preserve_chunked_trailers_as_headers: bool,
}

impl ParseConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionTarget {
    /// Leave the content coding as it is
    #[default]
    Keep,
    /// Remove any content coding
    None,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl CompressionTarget {
    /// Algorithm requested explicitly, `None` for `Keep` and `None`
    pub fn algorithm(&self) -> Option<CompressionAlgorithm> {
        match self {
            CompressionTarget::Keep | CompressionTarget::None => None,
            CompressionTarget::Gzip => Some(CompressionAlgorithm::Gzip),
            CompressionTarget::Deflate => Some(CompressionAlgorithm::Deflate),
            CompressionTarget::Brotli => Some(CompressionAlgorithm::Brotli),
            CompressionTarget::Zstd => Some(CompressionAlgorithm::Zstd),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkedTarget {
    /// Keep the body chunked if it is, unchunked otherwise
    #[default]
    Keep,
    Remove,
    /// Chunk the body with the given chunk size (0 for the default size)
    Apply(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// HTTP/1.x with the original start line
    #[default]
    Keep,
    /// HTTP/1.x with the version forced to HTTP/1.1
    Http11,
    /// `:method`/`:status` pseudo-headers instead of a start line
    #[serde(rename = "pseudo-header", alias = "pseudoheader")]
    PseudoHeader,
}

/// Options of the transcoding pipeline
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub compression: CompressionTarget,
    pub chunked: ChunkedTarget,
    pub style: OutputStyle,

    pub update_content_length: bool,
    pub update_content_encoding: bool,
    pub update_transfer_encoding: bool,

    /// Terminator forced on every line; the message's own otherwise
    pub line_separator: Option<LineEnding>,
    pub preserve_original_header_formatting: bool,

    /// Encoder level, the algorithm's default when unset
    pub compression_level: Option<u32>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            compression: CompressionTarget::Keep,
            chunked: ChunkedTarget::Keep,
            style: OutputStyle::Keep,

            update_content_length: true,
            update_content_encoding: true,
            update_transfer_encoding: true,

            line_separator: None,
            preserve_original_header_formatting: true,

            compression_level: None,
        }
    }
}

impl TranscodeConfig {
    /// Plain body: no content coding, no chunking
    pub fn decompressed() -> Self {
        Self {
            compression: CompressionTarget::None,
            chunked: ChunkedTarget::Remove,
            ..Self::default()
        }
    }

    /// Decompressed, HTTP/1.1, canonical headers, CRLF everywhere
    pub fn normalized() -> Self {
        Self {
            style: OutputStyle::Http11,
            line_separator: Some(LineEnding::Crlf),
            preserve_original_header_formatting: false,
            ..Self::decompressed()
        }
    }

    /// Pseudo-header representation. Chunking is always removed there.
    pub fn as_pseudo_header() -> Self {
        Self {
            style: OutputStyle::PseudoHeader,
            chunked: ChunkedTarget::Remove,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

pub fn load_parse_config(path: impl AsRef<Path>) -> Result<ParseConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    ParseConfig::from_toml_str(&content)
}

pub fn load_transcode_config(path: impl AsRef<Path>) -> Result<TranscodeConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    TranscodeConfig::from_toml_str(&content)
}
