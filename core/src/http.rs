//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The core
//! builds `HttpRequest` values and interprets `HttpResponse` values; the
//! injected [`Transport`](crate::Transport) performs the actual I/O.
//!
//! There is deliberately no `Patch` method: the target API receives partial
//! updates as full `PUT` requests, so the wire vocabulary cannot express it.

use std::fmt;

/// Header carrying the credentials of the configured API key.
pub const AUTHORIZATION: &str = "Authorization";
/// Header carrying the CSRF token.
pub const CSRF_TOKEN: &str = "X-CSRFToken";
/// Header carrying the real verb when the wire method is forced to `POST`.
pub const METHOD_OVERRIDE: &str = "X-HTTP-Method-Override";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const LOCATION: &str = "Location";

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `url` is whatever the resource URLs resolve to; it may be relative when the
/// entity roots are relative. Headers keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// A bodiless `GET` to `url` carrying `headers`.
    pub fn get(url: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers,
            body: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the transport after executing an `HttpRequest`. Non-2xx
/// statuses are still responses; interpreting them is the core's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION).filter(|value| !value.is_empty())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body carries anything besides whitespace.
    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }

    /// Canonical reason phrase for the status, or `"error"` for unknown codes.
    pub fn status_text(&self) -> &'static str {
        status_text(self.status)
    }
}

pub(crate) fn status_text(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("error")
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Set `name` to `value`, replacing any entry with the same name.
pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        Some(entry) => entry.1 = value,
        None => headers.push((name.to_string(), value)),
    }
}

/// Set `name` only when no entry with that name exists yet.
pub(crate) fn default_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    if find_header(headers, name).is_none() {
        headers.push((name.to_string(), value));
    }
}

/// `base` overlaid with `overrides`; overrides win on a case-insensitive match.
pub(crate) fn merge_headers(
    base: Vec<(String, String)>,
    overrides: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged = base;
    for (name, value) in overrides {
        set_header(&mut merged, name, value.clone());
    }
    merged
}
