use crate::http::DEFAULT_HTTP_VERSION;
use crate::http::headers::HeaderEntry;
use crate::http::message::HttpMessage;

use super::{OutputStyle, TranscodeConfig, Transcoded};

/// Headers with no meaning once the message is no longer HTTP/1.x
const CONNECTION_SPECIFIC: [&str; 5] = [
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "Upgrade",
];

fn is_connection_specific(entry: &HeaderEntry) -> bool {
    CONNECTION_SPECIFIC.iter().any(|name| entry.is_named(name))
}

pub(super) fn render<M: HttpMessage>(
    message: &M,
    resolved: &Transcoded,
    config: &TranscodeConfig,
) -> Vec<u8> {
    match config.style {
        OutputStyle::Keep | OutputStyle::Http11 => render_http1(message, resolved, config),
        OutputStyle::PseudoHeader => render_pseudo_header(message, resolved, config),
    }
}

fn render_http1<M: HttpMessage>(
    message: &M,
    resolved: &Transcoded,
    config: &TranscodeConfig,
) -> Vec<u8> {
    let payload = message.payload();
    let start_line = match config.style {
        OutputStyle::Http11 => message.canonical_start_line(DEFAULT_HTTP_VERSION),
        _ => message.start_line(),
    };

    let forced = config.line_separator.map(|l| l.as_str());
    let preserve = config.preserve_original_header_formatting;
    if preserve && forced.is_none() {
        let headers = resolved.headers.build();
        return payload.assemble(&start_line, &headers, &resolved.body);
    }

    let separator = forced.unwrap_or(payload.separator());
    let headers = if preserve {
        resolved.headers.build_with_terminator(separator)
    } else {
        resolved.headers.build_canonical(separator)
    };

    let mut out = Vec::with_capacity(start_line.len() + headers.len() + resolved.body.len() + 8);
    out.extend_from_slice(start_line.as_bytes());
    out.extend_from_slice(separator.as_bytes());
    out.extend_from_slice(headers.as_bytes());
    out.extend_from_slice(separator.as_bytes());
    out.extend_from_slice(&resolved.body);
    out
}

fn render_pseudo_header<M: HttpMessage>(
    message: &M,
    resolved: &Transcoded,
    config: &TranscodeConfig,
) -> Vec<u8> {
    let separator = config
        .line_separator
        .map_or(message.payload().separator(), |l| l.as_str());

    let mut head = String::new();
    for (name, value) in message.pseudo_headers() {
        head.push_str(&format!("{}: {}{}", name, value, separator));
    }
    for entry in resolved.headers.iter().filter(|e| !is_connection_specific(e)) {
        head.push_str(&format!(
            "{}: {}{}",
            entry.name.to_ascii_lowercase(),
            entry.value,
            separator
        ));
    }
    head.push_str(separator);

    let mut out = head.into_bytes();
    out.extend_from_slice(&resolved.body);
    out
}

#[cfg(test)]
mod tests {
    use crate::compression::{self, CompressionAlgorithm};
    use crate::http::LineEnding;
    use crate::http::request::HttpRequest;
    use crate::http::response::HttpResponse;
    use crate::transcode::{ChunkedTarget, CompressionTarget, OutputStyle, TranscodeConfig, transcode};

    #[test]
    fn keep_style_reproduces_unusual_formatting() {
        let raw = b"GET  /  HTTP/1.0\nhost:a\r\nX-Y :  z \n\nrest";
        let req = HttpRequest::parse(raw).unwrap();
        assert_eq!(transcode(&req, &TranscodeConfig::default()).unwrap(), raw);
    }

    #[test]
    fn forced_separator_keeps_line_text() {
        let raw = b"GET / HTTP/1.1\nhost:a\n\n";
        let req = HttpRequest::parse(raw).unwrap();
        let config = TranscodeConfig {
            line_separator: Some(LineEnding::Crlf),
            ..TranscodeConfig::default()
        };
        assert_eq!(
            transcode(&req, &config).unwrap(),
            b"GET / HTTP/1.1\r\nhost:a\r\n\r\n"
        );
    }

    #[test]
    fn normalized_output() {
        let body = compression::compress(b"hi there", CompressionAlgorithm::Gzip).unwrap();
        let mut raw = b"HTTP/1.0  200  OK\ncontent-encoding:gzip\nX-A:  b\n\n".to_vec();
        raw.extend_from_slice(&body);
        let res = HttpResponse::parse(&raw).unwrap();

        let out = transcode(&res, &TranscodeConfig::normalized()).unwrap();
        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nX-A: b\r\nContent-Length: 8\r\n\r\nhi there"
        );
    }

    #[test]
    fn pseudo_header_request() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\nTransfer-Encoding: chunked\r\nContent-Type: text/plain\r\n\r\n2\r\nok\r\n0\r\n\r\n";
        let req = HttpRequest::parse(raw).unwrap();
        let out = transcode(&req, &TranscodeConfig::as_pseudo_header()).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            ":method: POST\r\n:scheme: https\r\n:authority: example.com\r\n:path: /submit\r\n\
             host: example.com\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nok"
        );
    }

    #[test]
    fn pseudo_header_forces_unchunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nUpgrade: h2c\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let res = HttpResponse::parse(raw).unwrap();
        let config = TranscodeConfig {
            style: OutputStyle::PseudoHeader,
            chunked: ChunkedTarget::Apply(1),
            compression: CompressionTarget::Keep,
            ..TranscodeConfig::default()
        };

        assert_eq!(
            transcode(&res, &config).unwrap(),
            b":status: 200\r\ncontent-length: 3\r\n\r\nabc"
        );
    }
}
