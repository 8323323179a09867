//! Fault-tolerant, format-preserving HTTP/1.x message parsing and transcoding.
//!
//! Messages are parsed from raw bytes into [`HttpRequest`] / [`HttpResponse`]
//! values that write back byte for byte when left untouched. The
//! [`transcode`] pipeline moves a message between compression, chunking and
//! output styles while keeping the framing headers consistent.

pub mod chunked;
pub mod compression;
pub mod config;
pub mod http;
pub mod transcode;

pub use compression::CompressionAlgorithm;
pub use config::{ParseConfig, TranscodeConfig};
pub use http::headers::{HeaderEntry, HttpHeaders};
pub use http::message::HttpMessage;
pub use http::parser::ParseError;
pub use http::request::HttpRequest;
pub use http::response::HttpResponse;
pub use transcode::{TranscodeError, transcode};
