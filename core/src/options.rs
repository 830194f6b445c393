//! CRUD verbs and per-call request options.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::HttpMethod;

/// `limit` sent when the caller does not choose one; tastypie reads 0 as "no limit".
pub const DEFAULT_LIMIT: u64 = 0;
/// `format` sent when the caller does not choose one.
pub const DEFAULT_FORMAT: &str = "json";

/// Abstract CRUD operation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Read,
    Update,
    Patch,
    Delete,
}

impl Verb {
    /// Wire method for the verb. `Patch` is sent as a full `PUT`.
    pub fn method(self) -> HttpMethod {
        match self {
            Verb::Create => HttpMethod::Post,
            Verb::Read => HttpMethod::Get,
            Verb::Update | Verb::Patch => HttpMethod::Put,
            Verb::Delete => HttpMethod::Delete,
        }
    }

    /// Whether the verb carries the entity payload.
    pub fn has_body(self) -> bool {
        matches!(self, Verb::Create | Verb::Update | Verb::Patch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single sync call.
///
/// Every recognised key is a field; deserializing options from JSON rejects
/// anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    /// Extra headers; they win over the configured auth/CSRF headers.
    pub headers: Vec<(String, String)>,
    /// Sparse field selection; `pk` is always added.
    pub fields: Option<Vec<String>>,
    /// Page size, [`DEFAULT_LIMIT`] when unset.
    pub limit: Option<u64>,
    /// Page offset, omitted when unset.
    pub offset: Option<u64>,
    /// Response format, [`DEFAULT_FORMAT`] when unset.
    pub format: Option<String>,
    /// Arbitrary query parameters, applied last.
    pub url_params: BTreeMap<String, String>,
    /// Payload to send instead of the entity's own attributes.
    pub body: Option<Value>,
    /// Per-call override of [`SyncConfig::emulate_http`](crate::SyncConfig).
    pub emulate_http: Option<bool>,
    /// Per-call override of [`SyncConfig::emulate_json`](crate::SyncConfig).
    pub emulate_json: Option<bool>,
    /// Explicit target URL, used instead of the resolved resource URL.
    pub url: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.url_params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_emulate_http(mut self, enabled: bool) -> Self {
        self.emulate_http = Some(enabled);
        self
    }

    pub fn with_emulate_json(mut self, enabled: bool) -> Self {
        self.emulate_json = Some(enabled);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
