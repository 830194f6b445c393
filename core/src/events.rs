//! Event bus for centralised error surfacing.
//!
//! Every failed sync is published here before the caller sees the error, so
//! one subscriber can surface API errors for the whole application. Several
//! clients can share a bus by cloning it.

use tokio::sync::broadcast;

use crate::error::{ApiError, ErrorDetails};
use crate::options::Verb;

#[derive(Debug, Clone)]
pub enum Event {
    /// A sync call failed.
    ApiError(ApiErrorEvent),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ApiError(_) => "api-error",
        }
    }
}

/// Details of a failed sync call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrorEvent {
    pub details: ErrorDetails,
    /// Verb of the failed call.
    pub verb: Verb,
    /// Target URL, when one was resolved.
    pub url: Option<String>,
    /// pk of the source resource, when it had one.
    pub pk: Option<String>,
    pub status: Option<u16>,
    pub status_text: String,
    /// The raw failure: response body or error message.
    pub raw: String,
}

impl ApiErrorEvent {
    pub(crate) fn new(verb: Verb, url: Option<String>, pk: Option<String>, error: &ApiError) -> Self {
        Self {
            details: error.details(),
            verb,
            url,
            pk,
            status: error.status(),
            status_text: error.status_text(),
            raw: error.raw(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
