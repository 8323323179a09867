//! Transcoding pipeline: move a parsed message between compression states,
//! chunked and unchunked bodies, and HTTP/1.x or pseudo-header rendering,
//! keeping `Content-Encoding`, `Transfer-Encoding` and `Content-Length`
//! consistent with the body that is actually written.
//!
//! The body is resolved chunking first, compression second, since chunking
//! is the outer coding on the wire. Headers are only rewritten when their
//! value has to change, so untouched lines keep their original formatting.
//!
//! Unlike parsing, the pipeline reports compression failures: a requested
//! recompression that silently did nothing would corrupt the message.

mod render;

use thiserror::Error;
use tracing::trace;

use crate::chunked::{self, Trailers};
use crate::compression::{self, CompressionAlgorithm, CompressionError};
use crate::http::headers::HttpHeaders;
use crate::http::message::{HttpMessage, Payload, has_token};

pub use crate::config::{ChunkedTarget, CompressionTarget, OutputStyle, TranscodeConfig};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Compression(#[from] CompressionError),
}

/// Body and headers after resolution, before rendering
#[derive(Debug, Clone)]
pub struct Transcoded {
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
    /// Content coding of `body`
    pub compression: Option<CompressionAlgorithm>,
    /// Whether `body` is chunk encoded
    pub chunked: bool,
}

/// Transcode `message` and render it to bytes.
pub fn transcode<M: HttpMessage>(
    message: &M,
    config: &TranscodeConfig,
) -> Result<Vec<u8>, TranscodeError> {
    let resolved = resolve(message, config)?;
    Ok(render::render(message, &resolved, config))
}

/// Resolve the final body and headers without rendering.
pub fn resolve<M: HttpMessage>(
    message: &M,
    config: &TranscodeConfig,
) -> Result<Transcoded, TranscodeError> {
    let payload = message.payload();

    let current = payload.compression;
    let final_compression = match config.compression {
        CompressionTarget::Keep => current,
        target => target.algorithm(),
    };

    // the pseudo-header representation has no chunked coding
    let chunked_target = if config.style == OutputStyle::PseudoHeader {
        ChunkedTarget::Remove
    } else {
        config.chunked
    };
    let final_chunk_size = match chunked_target {
        ChunkedTarget::Keep if payload.is_body_chunked => Some(chunked::DEFAULT_CHUNK_SIZE),
        ChunkedTarget::Keep | ChunkedTarget::Remove => None,
        ChunkedTarget::Apply(size) => Some(chunked::effective_chunk_size(size)),
    };

    trace!(
        ?current,
        ?final_compression,
        ?final_chunk_size,
        "resolved transcode targets"
    );

    let body = resolve_body(payload, final_compression, final_chunk_size, config)?;

    let body_changed = body.as_slice() != payload.original_body();
    let mut headers = payload.headers.clone();
    if config.update_content_encoding {
        update_content_encoding(&mut headers, final_compression, current, body_changed);
    }
    if config.update_transfer_encoding {
        update_transfer_encoding(&mut headers, final_chunk_size.is_some());
    }
    if config.update_content_length {
        update_content_length(&mut headers, final_chunk_size.is_some(), body_changed, body.len());
    }

    Ok(Transcoded {
        headers,
        body,
        compression: final_compression,
        chunked: final_chunk_size.is_some(),
    })
}

fn resolve_body(
    payload: &Payload,
    final_compression: Option<CompressionAlgorithm>,
    final_chunk_size: Option<usize>,
    config: &TranscodeConfig,
) -> Result<Vec<u8>, TranscodeError> {
    let current = payload.compression;

    // still chunked on the wire and nothing inside has to change
    if payload.is_body_chunked && final_chunk_size.is_some() && final_compression == current {
        return Ok(payload.body.clone());
    }

    let mut trailers: Option<Trailers> = None;
    let mut data = if payload.is_body_chunked {
        let decoded = chunked::decode(&payload.body);
        if !decoded.trailers.is_empty() {
            trailers = Some(decoded.trailers);
        }
        decoded.body
    } else {
        payload.body.clone()
    };

    // content coding `data` currently carries
    let mut encoded_with = if payload.is_compressed { None } else { current };

    if final_compression != encoded_with && final_compression == current {
        if let Some(original) = payload.compressed_source() {
            data = original;
            encoded_with = current;
        }
    }

    if final_compression != encoded_with {
        if let Some(algorithm) = encoded_with {
            data = compression::decompress(&data, algorithm)?;
        }
        if let Some(algorithm) = final_compression {
            data = compression::compress_with_level(&data, algorithm, config.compression_level)?;
        }
    }

    if let Some(size) = final_chunk_size {
        data = chunked::encode(&data, size, trailers.as_ref());
    }
    Ok(data)
}

/// Bring `Content-Encoding` in line with the coding of the output body.
///
/// The header is compared with what it declares, not with the parsed state,
/// since a coding may have been sniffed from a body sent without one. A body
/// passed through untouched keeps the header it arrived with.
fn update_content_encoding(
    headers: &mut HttpHeaders,
    final_compression: Option<CompressionAlgorithm>,
    current: Option<CompressionAlgorithm>,
    body_changed: bool,
) {
    let declared = headers.get("Content-Encoding").and_then(compression::detect);
    if final_compression == declared || (final_compression == current && !body_changed) {
        return;
    }

    match final_compression {
        Some(algorithm) => headers.set("Content-Encoding", algorithm.as_str()),
        None => {
            headers.del_all("Content-Encoding");
        }
    }
}

fn update_transfer_encoding(headers: &mut HttpHeaders, chunked: bool) {
    let values: Vec<String> = headers
        .get_all("Transfer-Encoding")
        .into_iter()
        .map(str::to_string)
        .collect();
    if values.iter().any(|v| has_token(v, "chunked")) == chunked {
        return;
    }

    let mut tokens: Vec<&str> = values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("chunked"))
        .collect();
    if chunked {
        tokens.push("chunked");
    }

    if tokens.is_empty() {
        headers.del_all("Transfer-Encoding");
    } else if values.len() == 1 {
        headers.set("Transfer-Encoding", &tokens.join(", "));
    } else {
        headers.del_all("Transfer-Encoding");
        headers.add("Transfer-Encoding", &tokens.join(", "));
    }
}

/// Chunked bodies carry no `Content-Length`. Otherwise the header follows the
/// body whenever the body differs from what arrived on the wire; an unchanged
/// body keeps its original framing (HEAD responses, deliberate mismatches).
fn update_content_length(headers: &mut HttpHeaders, chunked: bool, body_changed: bool, body_len: usize) {
    if chunked {
        headers.del_all("Content-Length");
        return;
    }
    if !body_changed {
        return;
    }

    let length = body_len.to_string();
    let values = headers.get_all("Content-Length");
    if values.is_empty() {
        if body_len > 0 {
            headers.add("Content-Length", &length);
        }
        return;
    }
    if values.iter().all(|v| *v == length) {
        return;
    }

    headers.set("Content-Length", &length);
    headers.retain(|e| !e.is_named("Content-Length") || e.value == length);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseConfig;
    use crate::http::request::HttpRequest;
    use crate::http::response::HttpResponse;

    fn gzip(data: &[u8]) -> Vec<u8> {
        compression::compress(data, CompressionAlgorithm::Gzip).unwrap()
    }

    fn gzip_chunked_response() -> Vec<u8> {
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nTransfer-Encoding: chunked\r\nContent-Length: 999\r\n\r\n".to_vec();
        raw.extend_from_slice(&chunked::encode(&gzip(b"plain response text"), 7, None));
        raw
    }

    #[test]
    fn default_config_is_identity_for_consistent_messages() {
        let raw = b"POST /p HTTP/1.1\r\nHost: a\r\nContent-Length: 4\r\n\r\nbody";
        let req = HttpRequest::parse(raw).unwrap();
        assert_eq!(transcode(&req, &TranscodeConfig::default()).unwrap(), raw);

        let raw = gzip_chunked_response();
        let res = HttpResponse::parse(&raw).unwrap();
        let out = resolve(&res, &TranscodeConfig::default()).unwrap();
        assert!(out.chunked);
        assert_eq!(out.compression, Some(CompressionAlgorithm::Gzip));
        assert!(!out.headers.has("Content-Length"));
    }

    #[test]
    fn removing_both_codings_yields_plaintext() {
        let res = HttpResponse::parse(&gzip_chunked_response()).unwrap();
        let out = resolve(&res, &TranscodeConfig::decompressed()).unwrap();

        assert_eq!(out.body, b"plain response text");
        assert!(!out.chunked);
        assert_eq!(out.compression, None);
        assert!(!out.headers.has("Content-Encoding"));
        assert!(!out.headers.has("Transfer-Encoding"));
        assert_eq!(out.headers.get_all("Content-Length"), ["19"]);
    }

    #[test]
    fn recompress_with_another_algorithm() {
        let res = HttpResponse::parse(&gzip_chunked_response()).unwrap();
        let config = TranscodeConfig {
            compression: CompressionTarget::Zstd,
            chunked: ChunkedTarget::Remove,
            ..TranscodeConfig::default()
        };
        let out = resolve(&res, &config).unwrap();

        assert_eq!(out.headers.get("content-encoding"), Some("zstd"));
        assert_eq!(
            compression::decompress(&out.body, CompressionAlgorithm::Zstd).unwrap(),
            b"plain response text"
        );
        assert_eq!(out.headers.get("content-length"), Some(out.body.len().to_string().as_str()));
    }

    #[test]
    fn apply_chunking_to_plain_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nTransfer-Encoding: gzip\r\n\r\nhello world";
        let res = HttpResponse::parse(raw).unwrap();
        let config = TranscodeConfig {
            chunked: ChunkedTarget::Apply(5),
            ..TranscodeConfig::default()
        };
        let out = resolve(&res, &config).unwrap();

        assert_eq!(out.body, b"5\r\nhello\r\n5\r\n worl\r\n1\r\nd\r\n0\r\n\r\n");
        assert_eq!(out.headers.get("transfer-encoding"), Some("gzip, chunked"));
        assert!(!out.headers.has("content-length"));
    }

    #[test]
    fn update_flags_gate_header_rewrites() {
        let res = HttpResponse::parse(&gzip_chunked_response()).unwrap();
        let config = TranscodeConfig {
            update_content_length: false,
            update_content_encoding: false,
            update_transfer_encoding: false,
            ..TranscodeConfig::decompressed()
        };
        let out = resolve(&res, &config).unwrap();

        assert_eq!(out.body, b"plain response text");
        assert_eq!(out.headers.build(), res.headers().build());
    }

    #[test]
    fn failed_parse_time_decompression_surfaces_on_removal() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\nnot gzip";
        let res = HttpResponse::parse(raw).unwrap();
        assert!(!res.is_compressed());

        // keeping the coding passes the bytes through
        assert_eq!(transcode(&res, &TranscodeConfig::default()).unwrap(), raw);

        let err = transcode(&res, &TranscodeConfig::decompressed()).unwrap_err();
        assert!(matches!(err, TranscodeError::Compression(CompressionError::Decode { .. })));
    }

    #[test]
    fn unchanged_compression_reuses_original_bytes() {
        let packed = gzip(b"reuse me");
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\n".to_vec();
        raw.extend_from_slice(&packed);
        let res = HttpResponse::parse(&raw).unwrap();

        let config = TranscodeConfig {
            compression: CompressionTarget::Gzip,
            ..TranscodeConfig::default()
        };
        assert_eq!(resolve(&res, &config).unwrap().body, packed);
    }

    #[test]
    fn edited_body_is_compressed_again() {
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\n".to_vec();
        raw.extend_from_slice(&gzip(b"before"));
        let mut res = HttpResponse::parse(&raw).unwrap();
        res.set_body("after edit");

        let out = resolve(&res, &TranscodeConfig::default()).unwrap();
        assert_eq!(
            compression::decompress(&out.body, CompressionAlgorithm::Gzip).unwrap(),
            b"after edit"
        );
        assert_eq!(out.headers.get("Content-Length"), Some(out.body.len().to_string().as_str()));
    }

    #[test]
    fn rechunking_keeps_trailers() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n";
        let res = HttpResponse::parse(raw).unwrap();
        let config = TranscodeConfig {
            compression: CompressionTarget::Gzip,
            ..TranscodeConfig::default()
        };
        let out = resolve(&res, &config).unwrap();

        assert!(out.chunked);
        let decoded = chunked::decode(&out.body);
        assert_eq!(decoded.trailers["X-Sum"], "1");
        assert_eq!(
            compression::decompress(&decoded.body, CompressionAlgorithm::Gzip).unwrap(),
            b"abc"
        );
    }

    #[test]
    fn content_length_follows_edited_body_only() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nabc";
        let mut req = HttpRequest::parse_with(raw, &ParseConfig::default()).unwrap();

        // conflicting framing of an untouched body is passed through
        assert_eq!(transcode(&req, &TranscodeConfig::default()).unwrap(), raw);

        req.set_body("abcd");
        let out = resolve(&req, &TranscodeConfig::default()).unwrap();
        assert_eq!(out.headers.get_all("content-length"), ["4"]);
    }

    #[test]
    fn false_compression_signature_is_plain_data() {
        let raw = b"POST /calc HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nx^2+1";
        let mut req = HttpRequest::parse(raw).unwrap();
        assert_eq!(req.compression(), None);

        assert_eq!(transcode(&req, &TranscodeConfig::normalized()).unwrap(), raw);
        assert_eq!(transcode(&req, &TranscodeConfig::decompressed()).unwrap(), raw);

        req.set_body("hello");
        assert_eq!(
            transcode(&req, &TranscodeConfig::default()).unwrap(),
            b"POST /calc HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn sniffed_coding_without_header_gets_content_encoding() {
        let packed = gzip(b"original");
        let mut raw = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        raw.extend_from_slice(&packed);
        let mut res = HttpResponse::parse(&raw).unwrap();
        assert_eq!(res.compression(), Some(CompressionAlgorithm::Gzip));

        // untouched, it goes out the way it came in
        assert_eq!(transcode(&res, &TranscodeConfig::default()).unwrap(), raw);

        res.set_body("edited");
        let config = TranscodeConfig {
            compression: CompressionTarget::Gzip,
            ..TranscodeConfig::default()
        };
        let out = resolve(&res, &config).unwrap();
        assert_eq!(out.headers.get("Content-Encoding"), Some("gzip"));
        assert_eq!(
            compression::decompress(&out.body, CompressionAlgorithm::Gzip).unwrap(),
            b"edited"
        );

        let out = resolve(&res, &TranscodeConfig::decompressed()).unwrap();
        assert_eq!(out.body, b"edited");
        assert!(!out.headers.has("Content-Encoding"));
    }

    #[test]
    fn head_response_keeps_its_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n";
        let res = HttpResponse::parse(raw).unwrap();
        assert_eq!(transcode(&res, &TranscodeConfig::normalized()).unwrap(), raw);
    }
}
