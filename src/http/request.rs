use crate::chunked::Trailers;
use crate::config::ParseConfig;
use crate::http::DEFAULT_HTTP_VERSION;
use crate::http::cookie::{Cookie, parse_cookie_header};
use crate::http::headers::HttpHeaders;
use crate::http::message::{HttpMessage, Payload};
use crate::http::parser::{ParseError, RequestLine, parse_head, parse_request_line};

/// An HTTP/1.x request, parsed from raw bytes or built programmatically.
///
/// The start line is written back exactly as received until one of its
/// fields is changed, after which it is rendered as `METHOD URL VERSION`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    line: RequestLine,
    original_line: Option<(RequestLine, String)>,
    payload: Payload,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            line: RequestLine {
                method: method.to_string(),
                url: url.to_string(),
                version: DEFAULT_HTTP_VERSION.to_string(),
            },
            original_line: None,
            payload: Payload::new(),
        }
    }

    /// Parse with the default [`ParseConfig`].
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with(raw, &ParseConfig::default())
    }

    pub fn parse_with(raw: &[u8], config: &ParseConfig) -> Result<Self, ParseError> {
        let head = parse_head(raw)?;
        let line = parse_request_line(&head.start_line)?;
        let original_line = Some((line.clone(), head.start_line.clone()));

        Ok(Self {
            line,
            original_line,
            payload: Payload::from_head(head, raw, config),
        })
    }

    pub fn method(&self) -> &str {
        &self.line.method
    }

    pub fn set_method(&mut self, method: &str) {
        self.line.method = method.to_string();
    }

    pub fn url(&self) -> &str {
        &self.line.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.line.url = url.to_string();
    }

    pub fn version(&self) -> &str {
        &self.line.version
    }

    pub fn set_version(&mut self, version: &str) {
        self.line.version = version.to_string();
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.payload.headers
    }

    /// Replace the body with decoded content. Headers are left alone; run the
    /// message through the transcoding pipeline to bring them in line.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.payload.set_body(body.into());
    }

    /// Decode a chunked body now, see [`ParseConfig::auto_decode_chunked`].
    pub fn decode_chunked_body(&mut self, preserve_trailers: bool) -> Option<Trailers> {
        self.payload.decode_chunked_body(preserve_trailers)
    }

    /// Cookies sent in every `Cookie` header
    pub fn cookies(&self) -> Vec<Cookie> {
        self.payload
            .headers
            .get_all("Cookie")
            .into_iter()
            .flat_map(parse_cookie_header)
            .collect()
    }

    /// (scheme, authority, path) derived from the URL and the `Host` header
    fn target_parts(&self) -> (String, String, String) {
        let url = self.line.url.as_str();
        let host = self.payload.headers.get("Host").unwrap_or_default();

        let lower = url.to_ascii_lowercase();
        let absolute = ["http://", "https://"]
            .into_iter()
            .find(|prefix| lower.starts_with(*prefix));

        let Some(prefix) = absolute else {
            let path = if url.is_empty() { "/" } else { url };
            return ("https".to_string(), host.to_string(), path.to_string());
        };

        let scheme = &prefix[..prefix.len() - 3];
        let rest = &url[prefix.len()..];
        let split = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, path) = rest.split_at(split);
        let path = match path.chars().next() {
            None => "/".to_string(),
            Some('/') => path.to_string(),
            Some(_) => format!("/{}", path),
        };
        (scheme.to_string(), authority.to_string(), path)
    }
}

impl HttpMessage for HttpRequest {
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
        format!("{} {} {}", self.line.method, self.line.url, version)
    }

    fn pseudo_headers(&self) -> Vec<(String, String)> {
        let method = self.line.method.clone();
        if method.eq_ignore_ascii_case("CONNECT") {
            return vec![
                (":method".to_string(), method),
                (":authority".to_string(), self.line.url.clone()),
            ];
        }

        let (scheme, authority, path) = self.target_parts();
        let mut fields = vec![
            (":method".to_string(), method),
            (":scheme".to_string(), scheme),
        ];
        // origin-form target without a Host header
        if !authority.is_empty() {
            fields.push((":authority".to_string(), authority));
        }
        fields.push((":path".to_string(), path));
        fields
    }
}
