use crate::chunked::Trailers;
use crate::config::ParseConfig;
use crate::http::DEFAULT_HTTP_VERSION;
use crate::http::cookie::{SetCookie, parse_set_cookie};
use crate::http::headers::HttpHeaders;
use crate::http::message::{HttpMessage, Payload};
use crate::http::parser::{ParseError, StatusLine, parse_head, parse_status_line};
use crate::http::status::reason_phrase;

/// An HTTP/1.x response, parsed from raw bytes or built programmatically.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    line: StatusLine,
    original_line: Option<(StatusLine, String)>,
    payload: Payload,
}

impl HttpResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            line: StatusLine {
                version: DEFAULT_HTTP_VERSION.to_string(),
                status_code,
                reason: reason_phrase(status_code).unwrap_or("Unknown").to_string(),
            },
            original_line: None,
            payload: Payload::new(),
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with(raw, &ParseConfig::default())
    }

    pub fn parse_with(raw: &[u8], config: &ParseConfig) -> Result<Self, ParseError> {
        let head = parse_head(raw)?;
        let line = parse_status_line(&head.start_line)?;
        let original_line = Some((line.clone(), head.start_line.clone()));

        Ok(Self {
            line,
            original_line,
            payload: Payload::from_head(head, raw, config),
        })
    }

    pub fn version(&self) -> &str {
        &self.line.version
    }

    pub fn set_version(&mut self, version: &str) {
        self.line.version = version.to_string();
    }

    pub fn status_code(&self) -> u16 {
        self.line.status_code
    }

    pub fn set_status_code(&mut self, status_code: u16) {
        self.line.status_code = status_code;
    }

    pub fn status_text(&self) -> &str {
        &self.line.reason
    }

    pub fn set_status_text(&mut self, text: &str) {
        self.line.reason = text.to_string();
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.payload.headers
    }

    /// Replace the body with decoded content, see [`HttpRequest::set_body`](crate::http::request::HttpRequest::set_body).
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.payload.set_body(body.into());
    }

    pub fn decode_chunked_body(&mut self, preserve_trailers: bool) -> Option<Trailers> {
        self.payload.decode_chunked_body(preserve_trailers)
    }

    /// Every `Set-Cookie` header parsed on its own; unparseable ones are skipped.
    pub fn set_cookies(&self) -> Vec<SetCookie> {
        self.payload
            .headers
            .get_all("Set-Cookie")
            .into_iter()
            .filter_map(parse_set_cookie)
            .collect()
    }
}

impl HttpMessage for HttpResponse {
    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn start_line(&self) -> String {
        match &self.original_line {
            Some((parsed, text)) if *parsed == self.line => text.clone(),
            _ => self.canonical_start_line(&self.line.version),
        }
    }

    fn canonical_start_line(&self, version: &str) -> String {
        format!("{} {} {}", version, self.line.status_code, self.line.reason)
    }

    fn pseudo_headers(&self) -> Vec<(String, String)> {
        vec![(":status".to_string(), self.line.status_code.to_string())]
    }
}
