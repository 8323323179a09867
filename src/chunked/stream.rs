use std::io::{self, BufRead, BufReader, Read, Write};

use thiserror::Error;
use tracing::debug;

use super::{Trailers, effective_chunk_size, parse_chunk_size, parse_trailer_line, push_chunk, push_last_chunk};

/// Longest size or trailer line the reader will consume
const MAX_LINE: u64 = 8192;

/// Returned (wrapped in an [`io::Error`]) when writing to a closed [`ChunkedWriter`].
#[derive(Debug, Error)]
#[error("chunked stream already closed")]
pub struct StreamClosed;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, StreamClosed)
}

/// Decodes a chunked body while reading it.
///
/// The stream ends at the terminal chunk, at a malformed size line, or when
/// the underlying reader runs dry. Trailers are available once it has ended.
pub struct ChunkedReader<R> {
    inner: BufReader<R>,
    remaining_in_chunk: usize,
    data_terminator_pending: bool,
    ended: bool,
    trailers: Trailers,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            remaining_in_chunk: 0,
            data_terminator_pending: false,
            ended: false,
            trailers: Trailers::new(),
        }
    }

    /// Trailers read after the terminal chunk; `None` until the stream has ended.
    pub fn trailers(&self) -> Option<&Trailers> {
        self.ended.then_some(&self.trailers)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn into_inner(self) -> BufReader<R> {
        self.inner
    }

    /// Read one line without its terminator. `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let n = (&mut self.inner).take(MAX_LINE).read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Skip the CRLF (or bare LF) that follows chunk data, if present.
    fn skip_data_terminator(&mut self) -> io::Result<()> {
        if self.inner.fill_buf()?.first() == Some(&b'\r') {
            self.inner.consume(1);
        }
        if self.inner.fill_buf()?.first() == Some(&b'\n') {
            self.inner.consume(1);
        }
        Ok(())
    }

    fn read_trailers(&mut self) -> io::Result<()> {
        while let Some(line) = self.read_line()? {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = parse_trailer_line(&line) {
                self.trailers.insert(name, value);
            }
        }
        Ok(())
    }

    /// Move to the next chunk. Returns false when the stream has ended.
    fn next_chunk(&mut self) -> io::Result<bool> {
        if self.data_terminator_pending {
            self.skip_data_terminator()?;
            self.data_terminator_pending = false;
        }

        let Some(line) = self.read_line()? else {
            debug!("chunked stream ended without terminal chunk");
            self.ended = true;
            return Ok(false);
        };

        match parse_chunk_size(&line) {
            Some(0) => {
                self.read_trailers()?;
                self.ended = true;
                Ok(false)
            }
            Some(size) => {
                self.remaining_in_chunk = size;
                Ok(true)
            }
            None => {
                debug!(line = %String::from_utf8_lossy(&line), "malformed chunk size line");
                self.ended = true;
                Ok(false)
            }
        }
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.ended || buf.is_empty() {
            return Ok(0);
        }
        if self.remaining_in_chunk == 0 && !self.next_chunk()? {
            return Ok(0);
        }

        let want = buf.len().min(self.remaining_in_chunk);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            debug!(missing = self.remaining_in_chunk, "chunked stream truncated inside chunk");
            self.ended = true;
            return Ok(0);
        }

        self.remaining_in_chunk -= n;
        if self.remaining_in_chunk == 0 {
            self.data_terminator_pending = true;
        }
        Ok(n)
    }
}

/// Chunk-encodes everything written to it.
///
/// Each `write` is emitted right away as one or more chunks of at most the
/// configured size. [`close`](ChunkedWriter::close) must be called to write
/// the terminal chunk and the trailers.
pub struct ChunkedWriter<W: Write> {
    inner: W,
    chunk_size: usize,
    trailers: Trailers,
    closed: bool,
}

impl<W: Write> ChunkedWriter<W> {
    /// A `chunk_size` of 0 selects the default chunk size.
    pub fn new(inner: W, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: effective_chunk_size(chunk_size),
            trailers: Trailers::new(),
            closed: false,
        }
    }

    /// Register a trailer to be sent on close.
    pub fn add_trailer(&mut self, name: &str, value: &str) -> io::Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.trailers.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write the terminal chunk and trailers. Calling it again does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let mut tail = Vec::new();
        push_last_chunk(&mut tail, &self.trailers);
        self.inner.write_all(&tail)?;
        self.inner.flush()?;
        self.closed = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(closed_error());
        }
        // an empty chunk would read as the end of the body
        if buf.is_empty() {
            return Ok(0);
        }

        let mut unit = Vec::with_capacity(self.chunk_size.min(buf.len()) + 16);
        for chunk in buf.chunks(self.chunk_size) {
            unit.clear();
            push_chunk(&mut unit, chunk);
            self.inner.write_all(&unit)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_decodes_and_exposes_trailers_at_end() {
        let wire = b"4\r\nWiki\r\n5;ext\r\npedia\r\n0\r\nX-Trace: 7\r\n\r\nleftover";
        let mut reader = ChunkedReader::new(&wire[..]);
        assert!(reader.trailers().is_none());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out, b"Wikipedia");
        assert!(reader.is_ended());
        assert_eq!(reader.trailers().unwrap()["X-Trace"], "7");
    }

    #[test]
    fn reader_with_tiny_buffer() {
        let wire = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let mut reader = ChunkedReader::new(&wire[..]);
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
        assert!(reader.trailers().unwrap().is_empty());
    }

    #[test]
    fn reader_stops_on_malformed_size() {
        let mut reader = ChunkedReader::new(&b"3\r\nabc\r\nxyz\r\nmore\r\n"[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert!(reader.is_ended());
    }

    #[test]
    fn reader_handles_truncation() {
        let mut reader = ChunkedReader::new(&b"a\r\nabc"[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert!(reader.trailers().is_some());
    }

    #[test]
    fn writer_splits_and_closes_once() {
        let mut writer = ChunkedWriter::new(Vec::new(), 4);
        writer.write_all(b"abcdef").unwrap();
        writer.write_all(b"").unwrap();
        writer.add_trailer("X-Done", "yes").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        assert_eq!(
            writer.into_inner(),
            b"4\r\nabcd\r\n2\r\nef\r\n0\r\nX-Done: yes\r\n\r\n"
        );
    }

    #[test]
    fn writer_rejects_use_after_close() {
        let mut writer = ChunkedWriter::new(Vec::new(), 0);
        writer.close().unwrap();

        let err = writer.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(err.get_ref().is_some_and(|e| e.is::<StreamClosed>()));
        assert!(writer.add_trailer("X", "1").is_err());
    }

    #[test]
    fn writer_output_reads_back() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut writer = ChunkedWriter::new(Vec::new(), 1000);
        writer.write_all(&data).unwrap();
        writer.close().unwrap();
        let wire = writer.into_inner();

        let mut reader = ChunkedReader::new(&wire[..]);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
