//! Cookie helpers for the HTTP layer.
//!
//! The registry never touches requests or responses itself; these helpers
//! produce and read the `Set-Cookie` / `Cookie` header values carrying the
//! session identifier.

use std::fmt;

/// Cookie carrying a newly issued session identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    /// Request host without port; omitted when the host is unknown.
    pub domain: Option<String>,
}

impl SessionCookie {
    /// Build a cookie scoped to path `/` on `host`.
    pub fn new(name: impl Into<String>, value: impl Into<String>, host: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            domain: host.map(strip_port).filter(|h| !h.is_empty()).map(str::to_string),
        }
    }
}

impl fmt::Display for SessionCookie {
    /// Renders the value of a `Set-Cookie` header.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        Ok(())
    }
}

/// Extract a cookie's value from a `Cookie` request header.
///
/// Returns the first non-empty match.
pub fn session_id_from_cookie_header<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| key.trim() == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().trim_matches('"'))
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, e.g. "[::1]:8080".
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}
