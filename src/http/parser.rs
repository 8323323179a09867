//! Fault-tolerant parsing of the head of an HTTP/1.x message.
//!
//! Parsing is byte oriented rather than line oriented so the exact terminator
//! of every line survives (`\r\n`, `\n`, `\r` and runs such as `\r\r\n`).
//! Only three situations are treated as hard errors, see [`ParseError`].
//! Everything else degrades: header lines without a colon are stored under
//! [`MALFORMED_HEADER_NAME`], empty names under [`EMPTY_HEADER_NAME`],
//! bogus versions are replaced by [`DEFAULT_HTTP_VERSION`].

use thiserror::Error;
use tracing::debug;

use crate::http::headers::{HeaderEntry, HttpHeaders};
use crate::http::status::reason_phrase;
use crate::http::{DEFAULT_HTTP_VERSION, is_http_version};

pub const MALFORMED_HEADER_NAME: &str = "X-Malformed-Header";
pub const EMPTY_HEADER_NAME: &str = "X-Empty-Header-Name";

/// Conditions where no usable message model can be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty input")]
    EmptyInput,

    #[error("no start line")]
    NoStartLine,

    #[error("invalid status code: {0:?}")]
    InvalidStatusCode(String),
}

/// One line of input: text and terminator are both borrowed from the source.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Line<'a> {
    pub text: &'a [u8],
    pub terminator: &'a [u8],
    /// Offset right after the terminator
    pub next: usize,
}

/// Read the line starting at `start`.
///
/// A bare `\n` ends a line, as does a run of `\r` followed by one `\n`.
/// A `\r` that is not part of such a run ends the line on its own.
/// The last line of the input may have an empty terminator.
pub(crate) fn next_line(raw: &[u8], start: usize) -> Line<'_> {
    let rest = &raw[start..];
    let Some(end) = rest.iter().position(|&b| b == b'\r' || b == b'\n') else {
        return Line {
            text: rest,
            terminator: &rest[rest.len()..],
            next: raw.len(),
        };
    };

    let term_len = if rest[end] == b'\n' {
        1
    } else {
        let run = rest[end..].iter().take_while(|&&b| b == b'\r').count();
        if rest.get(end + run) == Some(&b'\n') {
            run + 1
        } else {
            1
        }
    };

    Line {
        text: &rest[..end],
        terminator: &rest[end..end + term_len],
        next: start + end + term_len,
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(|b| b.is_ascii_whitespace())
}

/// Head of a message split off from its body.
#[derive(Debug)]
pub(crate) struct Head {
    pub start_line: String,
    pub line_separator: String,
    pub headers: HttpHeaders,
    /// The blank line closing the header block, terminator included
    pub header_separator: String,
    pub body_start: usize,
}

/// Split `raw` into start line, header block and the offset where the body begins.
pub(crate) fn parse_head(raw: &[u8]) -> Result<Head, ParseError> {
    if raw.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let first = next_line(raw, 0);
    if is_blank(first.text) {
        return Err(ParseError::NoStartLine);
    }

    let (headers, header_separator, body_start) = parse_header_block(raw, first.next);

    Ok(Head {
        start_line: lossy(first.text),
        line_separator: lossy(first.terminator),
        headers,
        header_separator,
        body_start,
    })
}

/// Parse header lines starting at `start` until a blank line or the end of input.
///
/// Returns the headers, the blank line that ended them (empty when the
/// input ran out first) and the offset of the first body byte.
pub(crate) fn parse_header_block(raw: &[u8], start: usize) -> (HttpHeaders, String, usize) {
    let mut headers = HttpHeaders::new();
    let mut pos = start;

    while pos < raw.len() {
        let line = next_line(raw, pos);
        if is_blank(line.text) {
            let separator = lossy(&raw[pos..line.next]);
            return (headers, separator, line.next);
        }

        headers.push(parse_header_line(line.text, line.terminator));
        pos = line.next;
    }

    (headers, String::new(), raw.len())
}

fn parse_header_line(text: &[u8], terminator: &[u8]) -> HeaderEntry {
    let original = lossy(text);
    let terminator = lossy(terminator);

    let Some((name, value)) = original.split_once(':') else {
        debug!(line = %original, "header line without colon");
        return HeaderEntry::parsed(MALFORMED_HEADER_NAME, original.trim(), &original, &terminator);
    };

    let mut name = name.trim();
    if name.is_empty() {
        debug!(line = %original, "header line with empty name");
        name = EMPTY_HEADER_NAME;
    }

    HeaderEntry::parsed(name, value.trim(), &original, &terminator)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RequestLine {
    pub method: String,
    pub url: String,
    pub version: String,
}

/// `METHOD URL [VERSION]`, split on any run of whitespace.
pub(crate) fn parse_request_line(line: &str) -> Result<RequestLine, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ParseError::NoStartLine);
    }

    // a target containing spaces still ends with a version token
    let (url, version) = match parts.as_slice() {
        [_, url] => (url.to_string(), None),
        [_, middle @ .., last] if is_http_version(last) => (middle.join(" "), Some(*last)),
        [_, url, version, ..] => (url.to_string(), Some(*version)),
        _ => return Err(ParseError::NoStartLine),
    };

    Ok(RequestLine {
        method: parts[0].to_string(),
        url,
        version: coerce_version(version),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusLine {
    pub version: String,
    pub status_code: u16,
    pub reason: String,
}

/// `VERSION CODE [REASON...]`; a non numeric code is a hard error.
pub(crate) fn parse_status_line(line: &str) -> Result<StatusLine, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ParseError::NoStartLine);
    }

    let status_code = parts[1]
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidStatusCode(parts[1].to_string()))?;

    let reason = if parts.len() > 2 {
        parts[2..].join(" ")
    } else {
        reason_phrase(status_code).unwrap_or("Unknown").to_string()
    };

    Ok(StatusLine {
        version: coerce_version(Some(parts[0])),
        status_code,
        reason,
    })
}

fn coerce_version(version: Option<&str>) -> String {
    match version {
        Some(v) if is_http_version(v) => v.to_string(),
        Some(v) => {
            debug!(version = v, "replacing invalid HTTP version");
            DEFAULT_HTTP_VERSION.to_string()
        }
        None => DEFAULT_HTTP_VERSION.to_string(),
    }
}
