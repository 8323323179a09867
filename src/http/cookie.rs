//! Minimal cookie parsing over header values.
//!
//! `Cookie` request headers become name/value pairs; each `Set-Cookie`
//! response header becomes one [`SetCookie`]. Malformed pairs are skipped,
//! attribute names are matched case-insensitively and unknown attributes are
//! kept verbatim in [`SetCookie::extensions`].

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    pub extensions: Vec<String>,
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim().trim_matches('"')))
}

/// Parse a `Cookie` header value (`a=1; b=2`).
pub fn parse_cookie_header(value: &str) -> Vec<Cookie> {
    value
        .split(';')
        .filter_map(split_pair)
        .map(|(name, value)| Cookie {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

/// Parse one `Set-Cookie` header value. `None` when the leading pair is unusable.
pub fn parse_set_cookie(value: &str) -> Option<SetCookie> {
    let mut parts = value.split(';');
    let (name, value) = split_pair(parts.next()?)?;

    let mut cookie = SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        ..Default::default()
    };

    for attribute in parts.map(str::trim).filter(|a| !a.is_empty()) {
        let (key, val) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attribute, None),
        };

        match (key.to_ascii_lowercase().as_str(), val) {
            ("domain", Some(v)) => cookie.domain = Some(v.to_string()),
            ("path", Some(v)) => cookie.path = Some(v.to_string()),
            ("expires", Some(v)) => cookie.expires = Some(v.to_string()),
            ("max-age", Some(v)) if v.parse::<i64>().is_ok() => cookie.max_age = v.parse().ok(),
            ("samesite", Some(v)) => cookie.same_site = Some(v.to_string()),
            ("secure", None) => cookie.secure = true,
            ("httponly", None) => cookie.http_only = true,
            _ => cookie.extensions.push(attribute.to_string()),
        }
    }

    Some(cookie)
}
