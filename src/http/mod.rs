use serde::Deserialize;

pub mod cookie;
pub mod headers;
pub mod message;
pub mod parser;
pub mod request;
pub mod response;
pub mod status;

/// Version substituted when a start line carries no usable `HTTP/` token.
pub const DEFAULT_HTTP_VERSION: &str = "HTTP/1.1";

/// Line terminators a message can be rendered with.
/// Parsed messages keep whatever terminator they arrived with, this enum
/// only covers the choices a caller can force on output.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Crlf,
    Lf,
    Cr,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
        }
    }
}

/// Check whether a start-line token looks like an HTTP version (`HTTP/` prefix, any case)
pub fn is_http_version(token: &str) -> bool {
    token
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("HTTP/"))
}
