//! Chunked transfer coding (RFC 7230 §4.1), batch and streaming.
//!
//! Decoding is best effort and never fails. Whatever could be recovered is
//! returned together with a [`DecodeStatus`] telling the caller whether the
//! input was complete, so the decision to surface a problem stays with the
//! caller.

use indexmap::IndexMap;

mod stream;

pub use stream::{ChunkedReader, ChunkedWriter, StreamClosed};

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Longest first line [`is_chunked`] accepts as a size line
const MAX_SIZE_LINE_GUESS: usize = 16;

/// Trailer fields that followed the last chunk
pub type Trailers = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Terminal chunk and trailer section were both present
    Complete,
    /// A size line was not valid hex; decoding stopped there
    InvalidSize,
    /// Input ended inside a size line or inside chunk data
    Truncated,
    /// Terminal chunk seen, but the trailer section never ended
    MissingTerminator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedBody {
    pub body: Vec<u8>,
    pub trailers: Trailers,
    pub status: DecodeStatus,
}

impl ChunkedBody {
    pub fn is_complete(&self) -> bool {
        self.status == DecodeStatus::Complete
    }
}

/// Locate the end of the line at the start of `data`.
/// Returns (line length, terminator length); `\r\n` and a bare `\n` both count.
fn find_line_end(data: &[u8]) -> Option<(usize, usize)> {
    let nl = data.iter().position(|&b| b == b'\n')?;
    if nl > 0 && data[nl - 1] == b'\r' {
        Some((nl - 1, 2))
    } else {
        Some((nl, 1))
    }
}

/// Hex size of a chunk, ignoring any `;extension`.
pub(crate) fn parse_chunk_size(line: &[u8]) -> Option<usize> {
    let line = match line.iter().position(|&b| b == b';') {
        Some(i) => &line[..i],
        None => line,
    };
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() || text.starts_with('+') {
        return None;
    }
    usize::from_str_radix(text, 16).ok()
}

/// Parse one `Name: Value` trailer line, `None` for anything malformed.
pub(crate) fn parse_trailer_line(line: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(line);
    let (name, value) = text.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Parse the trailer section. The flag tells whether the closing blank line was found.
fn parse_trailers(data: &[u8]) -> (Trailers, bool) {
    let mut trailers = Trailers::new();
    let mut pos = 0;

    while pos < data.len() {
        let Some((len, term)) = find_line_end(&data[pos..]) else {
            // unterminated last line, keep it if it parses
            if let Some((name, value)) = parse_trailer_line(&data[pos..]) {
                trailers.insert(name, value);
            }
            return (trailers, false);
        };

        let line = &data[pos..pos + len];
        if line.is_empty() {
            return (trailers, true);
        }
        if let Some((name, value)) = parse_trailer_line(line) {
            trailers.insert(name, value);
        }
        pos += len + term;
    }

    (trailers, false)
}

/// Decode a chunked body, returning the data recovered and any trailers.
pub fn decode(data: &[u8]) -> ChunkedBody {
    let mut body = Vec::new();
    let mut trailers = Trailers::new();
    let mut pos = 0;

    let status = loop {
        let Some((len, term)) = find_line_end(&data[pos..]) else {
            break DecodeStatus::Truncated;
        };

        let Some(size) = parse_chunk_size(&data[pos..pos + len]) else {
            break DecodeStatus::InvalidSize;
        };
        pos += len + term;

        if size == 0 {
            let (parsed, complete) = parse_trailers(&data[pos..]);
            trailers = parsed;
            break if complete {
                DecodeStatus::Complete
            } else {
                DecodeStatus::MissingTerminator
            };
        }

        let remaining = data.len() - pos;
        if size > remaining {
            body.extend_from_slice(&data[pos..]);
            break DecodeStatus::Truncated;
        }

        body.extend_from_slice(&data[pos..pos + size]);
        pos += size;

        if data[pos..].starts_with(b"\r\n") {
            pos += 2;
        } else if data[pos..].starts_with(b"\n") {
            pos += 1;
        }
    };

    ChunkedBody {
        body,
        trailers,
        status,
    }
}

pub(crate) fn push_chunk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

pub(crate) fn push_last_chunk(out: &mut Vec<u8>, trailers: &Trailers) {
    out.extend_from_slice(b"0\r\n");
    for (name, value) in trailers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
}

/// Encode `data` as chunks of at most `chunk_size` bytes (0 means [`DEFAULT_CHUNK_SIZE`]).
pub fn encode(data: &[u8], chunk_size: usize, trailers: Option<&Trailers>) -> Vec<u8> {
    let chunk_size = effective_chunk_size(chunk_size);
    let mut out = Vec::with_capacity(data.len() + 16 * (data.len() / chunk_size + 2));

    for chunk in data.chunks(chunk_size) {
        push_chunk(&mut out, chunk);
    }
    push_last_chunk(&mut out, trailers.unwrap_or(&Trailers::new()));
    out
}

pub(crate) fn effective_chunk_size(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// Guess whether `data` starts with a chunk size line.
///
/// Only a heuristic: a short first line that parses as hex.
pub fn is_chunked(data: &[u8]) -> bool {
    match find_line_end(data) {
        Some((len, _)) if len <= MAX_SIZE_LINE_GUESS => {
            parse_chunk_size(&data[..len]).is_some()
        }
        _ => false,
    }
}
