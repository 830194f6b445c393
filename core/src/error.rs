//! Error types for the tastypie client.
//!
//! # Design
//! Every failure the caller can observe is one `ApiError`. Non-2xx responses
//! land in `Http` with the raw status and body; the body is additionally
//! parsed into `ErrorDetails` so callers can read tastypie's `error_message`
//! without a second decoding step. A body that is not the expected shape is
//! kept verbatim in `ErrorDetails::Raw` instead of raising another error.

use serde_json::Value;
use thiserror::Error;

use crate::http::{status_text, HttpResponse};

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the sync entry points and request builders.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Neither the target nor its collection resolved to a URL. No request
    /// was sent.
    #[error("no url could be resolved for the target")]
    NoUrl,

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} {status_text}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
        details: ErrorDetails,
    },

    /// The transport could not complete the round-trip.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A success body could not be decoded as JSON.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        ApiError::Http {
            status: response.status,
            status_text: response.status_text().to_string(),
            body: response.body.clone(),
            details: ErrorDetails::from_body(&response.body),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Short status label: the HTTP reason phrase, or the error kind.
    pub fn status_text(&self) -> String {
        match self {
            ApiError::NoUrl => "no url".to_string(),
            ApiError::Http { status_text, .. } => status_text.clone(),
            ApiError::Transport(_) => status_text(0).to_string(),
            ApiError::Serialization(_) => "serialization".to_string(),
            ApiError::Deserialization(_) => "parsererror".to_string(),
        }
    }

    /// Parsed failure details. Only `Http` errors carry a server body.
    pub fn details(&self) -> ErrorDetails {
        match self {
            ApiError::Http { details, .. } => details.clone(),
            other => ErrorDetails::Raw(other.to_string()),
        }
    }

    /// The raw failure text: the response body for `Http`, the message otherwise.
    pub fn raw(&self) -> String {
        match self {
            ApiError::Http { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What could be read out of a failure body.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetails {
    /// The body was empty.
    Empty,
    /// The body was a JSON object. Tastypie puts `error_message` and, in debug
    /// mode, `traceback` there; validation errors use other keys, kept in `body`.
    Structured {
        error_message: Option<String>,
        traceback: Option<String>,
        body: Value,
    },
    /// The body was not a JSON object; kept as-is.
    Raw(String),
}

impl ErrorDetails {
    pub fn from_body(body: &str) -> Self {
        if body.trim().is_empty() {
            return ErrorDetails::Empty;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value @ Value::Object(_)) => {
                let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
                ErrorDetails::Structured {
                    error_message: text("error_message"),
                    traceback: text("traceback"),
                    body: value,
                }
            }
            _ => ErrorDetails::Raw(body.to_string()),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ErrorDetails::Structured { error_message, .. } => error_message.as_deref(),
            _ => None,
        }
    }

    pub fn traceback(&self) -> Option<&str> {
        match self {
            ErrorDetails::Structured { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }
}
