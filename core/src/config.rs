//! Client-wide configuration.
//!
//! One `SyncConfig` is injected into each [`TastypieClient`](crate::TastypieClient),
//! so clients with different credentials can coexist in one process.

use crate::http::{AUTHORIZATION, CSRF_TOKEN};
use crate::options::Verb;

/// Tastypie `ApiKeyAuthentication` credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub username: String,
    pub key: String,
}

impl ApiKey {
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            key: key.into(),
        }
    }

    /// `ApiKey <username>:<key>`.
    pub fn header_value(&self) -> String {
        format!("ApiKey {}:{}", self.username, self.key)
    }
}

/// Configuration read on every sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Sent as `Authorization` when the username is non-empty.
    pub api_key: Option<ApiKey>,
    /// Sent as `X-CSRFToken` when non-empty.
    pub csrf_token: Option<String>,
    /// Follow an empty 201/202/204 create response with a `GET`.
    pub get_after_empty_create: bool,
    /// Follow an empty 201/202/204 update response with a `GET`.
    pub get_after_empty_update: bool,
    /// Send `PUT`/`DELETE` as `POST` plus `X-HTTP-Method-Override`.
    pub emulate_http: bool,
    /// Send payloads form-encoded under a single `model` field.
    pub emulate_json: bool,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self {
            api_key: None,
            csrf_token: None,
            get_after_empty_create: true,
            get_after_empty_update: false,
            emulate_http: false,
            emulate_json: false,
        }
    }

    pub fn with_api_key(mut self, username: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(username, key));
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn with_get_after_empty_create(mut self, enabled: bool) -> Self {
        self.get_after_empty_create = enabled;
        self
    }

    pub fn with_get_after_empty_update(mut self, enabled: bool) -> Self {
        self.get_after_empty_update = enabled;
        self
    }

    pub fn with_emulate_http(mut self, enabled: bool) -> Self {
        self.emulate_http = enabled;
        self
    }

    pub fn with_emulate_json(mut self, enabled: bool) -> Self {
        self.emulate_json = enabled;
        self
    }

    /// Whether an empty acknowledgement of `verb` should trigger a follow-up read.
    pub fn follows_empty_write(&self, verb: Verb) -> bool {
        match verb {
            Verb::Create => self.get_after_empty_create,
            Verb::Update => self.get_after_empty_update,
            Verb::Read | Verb::Patch | Verb::Delete => false,
        }
    }

    /// Authorization and CSRF headers, in that order, for the configured values.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(api_key) = self.api_key.as_ref().filter(|k| !k.username.is_empty()) {
            headers.push((AUTHORIZATION.to_string(), api_key.header_value()));
        }
        if let Some(token) = self.csrf_token.as_ref().filter(|t| !t.is_empty()) {
            headers.push((CSRF_TOKEN.to_string(), token.clone()));
        }
        headers
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
