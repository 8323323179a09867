//! State shared by requests and responses: headers, body forms and the
//! formatting details needed to write a message back out unchanged.
//!
//! Body resolution after parsing happens here. Chunking is resolved first,
//! since it is the outer wire coding, and compression second. A body that is
//! still chunked is not decompressed; its declared algorithm is recorded so
//! later stages know what they are dealing with.

use std::mem;

use tracing::debug;

use crate::chunked::{self, Trailers};
use crate::compression::{self, CompressionAlgorithm};
use crate::config::ParseConfig;
use crate::http::headers::HttpHeaders;
use crate::http::parser::Head;

const FALLBACK_SEPARATOR: &str = "\r\n";

#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub(crate) headers: HttpHeaders,
    pub(crate) body: Vec<u8>,
    pub(crate) raw_body: Option<Vec<u8>>,
    pub(crate) raw_message: Vec<u8>,
    pub(crate) is_body_chunked: bool,
    pub(crate) is_compressed: bool,
    pub(crate) compression: Option<CompressionAlgorithm>,
    pub(crate) line_separator: String,
    header_separator: String,
    // offset of the body in `raw_message`
    body_start: usize,
    // the body arrived chunked, even if it has been decoded since
    wire_chunked: bool,
}

/// Check a comma separated header value for a token, ignoring case.
pub fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

impl Payload {
    /// Empty payload for a message built in code
    pub(crate) fn new() -> Self {
        Self {
            line_separator: FALLBACK_SEPARATOR.to_string(),
            header_separator: FALLBACK_SEPARATOR.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn from_head(head: Head, raw: &[u8], config: &ParseConfig) -> Self {
        let mut payload = Self {
            headers: head.headers,
            body: raw[head.body_start..].to_vec(),
            raw_body: None,
            raw_message: raw.to_vec(),
            is_body_chunked: false,
            is_compressed: false,
            compression: None,
            line_separator: head.line_separator,
            header_separator: head.header_separator,
            body_start: head.body_start,
            wire_chunked: false,
        };

        let chunked = payload
            .headers
            .get_all("Transfer-Encoding")
            .iter()
            .any(|v| has_token(v, "chunked"));
        if chunked {
            payload.is_body_chunked = true;
            payload.wire_chunked = true;
        }

        if payload.is_body_chunked && config.auto_decode_chunked {
            payload.decode_chunked_body(config.preserve_chunked_trailers_as_headers);
        } else {
            payload.resolve_compression();
        }
        payload
    }

    /// Decode a chunked body in place.
    ///
    /// The wire bytes move to `raw_body`, `Transfer-Encoding` is removed and
    /// `Content-Length` set to the decoded length. With `merge_trailers` the
    /// trailers are appended as regular headers. Decompression is attempted
    /// afterwards. Returns the trailers, or `None` if the body was not chunked.
    pub(crate) fn decode_chunked_body(&mut self, merge_trailers: bool) -> Option<Trailers> {
        if !self.is_body_chunked {
            return None;
        }

        let decoded = chunked::decode(&self.body);
        if !decoded.is_complete() {
            debug!(status = ?decoded.status, recovered = decoded.body.len(), "partial chunked body");
        }

        let wire = mem::replace(&mut self.body, decoded.body);
        self.raw_body.get_or_insert(wire);
        self.is_body_chunked = false;

        self.headers.del_all("Transfer-Encoding");
        self.headers
            .set("Content-Length", &self.body.len().to_string());
        if merge_trailers {
            for (name, value) in &decoded.trailers {
                self.headers.add(name, value);
            }
        }

        self.resolve_compression();
        Some(decoded.trailers)
    }

    fn resolve_compression(&mut self) {
        let declared = self
            .headers
            .get("Content-Encoding")
            .and_then(compression::detect);

        if self.is_body_chunked {
            self.compression = declared;
            self.is_compressed = false;
            return;
        }

        let Some(algorithm) = declared.or_else(|| compression::detect_by_magic_bytes(&self.body))
        else {
            return;
        };
        // a declared coding is recorded even if the body turns out not to match it
        if declared.is_some() {
            self.compression = Some(algorithm);
        }
        if self.body.is_empty() {
            return;
        }

        match compression::decompress(&self.body, algorithm) {
            Ok(plain) => {
                let wire = mem::replace(&mut self.body, plain);
                self.raw_body.get_or_insert(wire);
                self.compression = Some(algorithm);
                self.is_compressed = true;
            }
            Err(err) => {
                debug!(%algorithm, sniffed = declared.is_none(), error = %err, "keeping body as received");
                self.is_compressed = false;
            }
        }
    }

    /// Replace the logical body. The bytes are taken as decoded content.
    pub(crate) fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
        self.raw_body = None;
        self.is_body_chunked = false;
        self.is_compressed = self.compression.is_some();
    }

    /// Body bytes as they go on the wire for an as-is rebuild
    pub(crate) fn wire_body(&self) -> &[u8] {
        self.raw_body.as_deref().unwrap_or(&self.body)
    }

    /// Body exactly as it was parsed, empty for messages built in code
    pub(crate) fn original_body(&self) -> &[u8] {
        self.raw_message.get(self.body_start..).unwrap_or_default()
    }

    /// Original compressed bytes, available while the body is untouched
    pub(crate) fn compressed_source(&self) -> Option<Vec<u8>> {
        if !self.is_compressed {
            return None;
        }
        let raw = self.raw_body.as_ref()?;
        if self.wire_chunked {
            Some(chunked::decode(raw).body)
        } else {
            Some(raw.clone())
        }
    }

    /// Serialize as received, given the (possibly edited) start line.
    pub(crate) fn build(&self, start_line: &str) -> Vec<u8> {
        self.assemble(start_line, &self.headers.build(), self.wire_body())
    }

    /// Join a start line, a built header block and body bytes using the
    /// separators recorded at parse time.
    pub(crate) fn assemble(&self, start_line: &str, headers: &str, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(start_line.len() + headers.len() + body.len() + 8);
        out.extend_from_slice(start_line.as_bytes());

        let has_more = !headers.is_empty() || !self.header_separator.is_empty() || !body.is_empty();
        if !self.line_separator.is_empty() || has_more {
            out.extend_from_slice(self.separator().as_bytes());
        }
        out.extend_from_slice(headers.as_bytes());

        if self.header_separator.is_empty() && !body.is_empty() {
            // the header block was never closed; close it before the new body
            if !headers.is_empty() && !headers.ends_with(['\n', '\r']) {
                out.extend_from_slice(self.separator().as_bytes());
            }
            out.extend_from_slice(self.separator().as_bytes());
        } else {
            out.extend_from_slice(self.header_separator.as_bytes());
        }

        out.extend_from_slice(body);
        out
    }

    /// Blank line closing the header block, the line separator if there was none
    pub(crate) fn header_separator(&self) -> &str {
        if self.header_separator.is_empty() {
            self.separator()
        } else {
            &self.header_separator
        }
    }

    /// Separator for lines written after the start line
    pub(crate) fn separator(&self) -> &str {
        if self.line_separator.is_empty() {
            FALLBACK_SEPARATOR
        } else {
            &self.line_separator
        }
    }
}

/// Read access shared by [`HttpRequest`](crate::http::request::HttpRequest)
/// and [`HttpResponse`](crate::http::response::HttpResponse), used by the
/// transcoding pipeline.
pub trait HttpMessage {
    #[doc(hidden)]
    fn payload(&self) -> &Payload;

    /// Start line as it should be written by an as-is rebuild
    fn start_line(&self) -> String;

    /// Start line rebuilt from its fields, with `version` substituted
    fn canonical_start_line(&self, version: &str) -> String;

    /// Pseudo-header fields replacing the start line in the pseudo-header representation
    fn pseudo_headers(&self) -> Vec<(String, String)>;

    fn headers(&self) -> &HttpHeaders {
        &self.payload().headers
    }

    fn body(&self) -> &[u8] {
        &self.payload().body
    }

    fn raw_body(&self) -> Option<&[u8]> {
        self.payload().raw_body.as_deref()
    }

    /// Complete input the message was parsed from
    fn raw_message(&self) -> &[u8] {
        &self.payload().raw_message
    }

    fn is_body_chunked(&self) -> bool {
        self.payload().is_body_chunked
    }

    fn is_compressed(&self) -> bool {
        self.payload().is_compressed
    }

    fn compression(&self) -> Option<CompressionAlgorithm> {
        self.payload().compression
    }

    /// Terminator of the start line, reused when rebuilding
    fn line_separator(&self) -> &str {
        &self.payload().line_separator
    }

    /// Serialize the message, byte for byte identical to the input when nothing changed.
    fn build(&self) -> Vec<u8> {
        self.payload().build(&self.start_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::parse_head;

    fn payload(raw: &[u8], config: &ParseConfig) -> Payload {
        Payload::from_head(parse_head(raw).unwrap(), raw, config)
    }

    #[test]
    fn token_lists() {
        assert!(has_token("gzip, Chunked", "chunked"));
        assert!(has_token("chunked", "chunked"));
        assert!(!has_token("gzip", "chunked"));
        assert!(!has_token("notchunked", "chunked"));
    }

    #[test]
    fn chunked_body_stays_on_the_wire_by_default() {
        let raw = b"X 1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let p = payload(raw, &ParseConfig::default());

        assert!(p.is_body_chunked);
        assert_eq!(p.body, b"3\r\nabc\r\n0\r\n\r\n");
        assert!(p.raw_body.is_none());
        assert_eq!(p.build("X 1"), raw);
    }

    #[test]
    fn auto_decode_moves_wire_bytes_and_fixes_headers() {
        let raw = b"X 1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-T: 9\r\n\r\n";
        let config = ParseConfig {
            auto_decode_chunked: true,
            preserve_chunked_trailers_as_headers: true,
        };
        let p = payload(raw, &config);

        assert!(!p.is_body_chunked);
        assert_eq!(p.body, b"abc");
        assert_eq!(p.raw_body.as_deref(), Some(&b"3\r\nabc\r\n0\r\nX-T: 9\r\n\r\n"[..]));
        assert!(!p.headers.has("transfer-encoding"));
        assert_eq!(p.headers.get("content-length"), Some("3"));
        assert_eq!(p.headers.get("x-t"), Some("9"));
    }

    #[test]
    fn failed_decompression_keeps_raw_bytes() {
        let raw = b"X 1\r\nContent-Encoding: gzip\r\n\r\nnot gzip at all";
        let p = payload(raw, &ParseConfig::default());

        assert!(!p.is_compressed);
        assert_eq!(p.compression, Some(CompressionAlgorithm::Gzip));
        assert_eq!(p.body, b"not gzip at all");
        assert_eq!(p.wire_body(), b"not gzip at all");
    }

    #[test]
    fn false_signature_is_not_recorded_as_compression() {
        // "x^" is a valid zlib header
        let raw = b"X 1\r\nContent-Length: 5\r\n\r\nx^2+1";
        let mut p = payload(raw, &ParseConfig::default());

        assert!(!p.is_compressed);
        assert_eq!(p.compression, None);
        assert_eq!(p.body, b"x^2+1");

        p.set_body(b"hello".to_vec());
        assert!(!p.is_compressed);
    }

    #[test]
    fn set_body_marks_logical_content() {
        let raw = b"X 1\r\nContent-Encoding: gzip\r\n\r\n???";
        let mut p = payload(raw, &ParseConfig::default());
        p.set_body(b"plain".to_vec());

        assert!(p.is_compressed);
        assert!(p.raw_body.is_none());
        assert!(p.compressed_source().is_none());
    }

    #[test]
    fn build_closes_unterminated_header_block_before_new_body() {
        let raw = b"X 1\nA: 1";
        let mut p = payload(raw, &ParseConfig::default());
        assert_eq!(p.build("X 1"), raw);

        p.set_body(b"data".to_vec());
        assert_eq!(p.build("X 1"), b"X 1\nA: 1\n\ndata");
    }

    #[test]
    fn bare_start_line_round_trips() {
        let p = payload(b"GET /", &ParseConfig::default());
        assert_eq!(p.build("GET /"), b"GET /");

        let p = payload(b"GET /\r\n", &ParseConfig::default());
        assert_eq!(p.build("GET /"), b"GET /\r\n");
    }
}
