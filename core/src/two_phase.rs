//! Two-phase writes: following an empty write acknowledgement with a read.
//!
//! # Design
//! Tastypie answers creates with `201 Created`, a `Location` header and no
//! body unless `always_return_data` is set; updates get `204 No Content`.
//! When the client is configured to want the representation anyway, the
//! write is followed by a `GET` of the location.
//!
//! The protocol is a small state machine advanced by one loop, so a call ends
//! in exactly one of `Resolved` or `Failed` no matter how many round-trips it
//! took.

use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::decode_body;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Where a two-phase write currently stands.
#[derive(Debug)]
pub enum WritePhase {
    /// The primary write is about to be, or has been, sent.
    Dispatched,
    /// The write was acknowledged without a body; `target` is read next.
    AwaitingFollowUp { target: String },
    /// Terminal: the representation, if any.
    Resolved(Option<Value>),
    /// Terminal: the primary write or the follow-up failed.
    Failed(ApiError),
}

/// Statuses tastypie uses to acknowledge a write without returning it.
pub fn is_empty_write_status(status: u16) -> bool {
    matches!(status, 201 | 202 | 204)
}

/// Phase after the primary write answered with `response`.
///
/// `fallback` is the entity's own URL, used when the server sent no
/// `Location`. With neither, the accepted write resolves without a body.
pub fn after_primary(response: &HttpResponse, fallback: Option<String>) -> WritePhase {
    if !response.is_success() {
        return WritePhase::Failed(ApiError::from_response(response));
    }
    if is_empty_write_status(response.status) && !response.has_body() {
        return match response.location().map(str::to_string).or(fallback) {
            Some(target) => WritePhase::AwaitingFollowUp { target },
            None => {
                warn!(
                    status = response.status,
                    "write acknowledged without Location and target has no pk, skipping read-back"
                );
                WritePhase::Resolved(None)
            }
        };
    }
    settle(response)
}

/// Phase after the follow-up read answered with `response`.
pub fn after_follow_up(response: &HttpResponse) -> WritePhase {
    if !response.is_success() {
        return WritePhase::Failed(ApiError::from_response(response));
    }
    settle(response)
}

fn settle(response: &HttpResponse) -> WritePhase {
    match decode_body(response) {
        Ok(body) => WritePhase::Resolved(body),
        Err(e) => WritePhase::Failed(e),
    }
}

/// Send `primary` and, when it is acknowledged empty, read the written resource.
///
/// The follow-up reuses the primary request's headers.
pub async fn run<T: Transport + ?Sized>(
    transport: &T,
    primary: HttpRequest,
    fallback: Option<String>,
) -> ApiResult<Option<Value>> {
    let headers = primary.headers.clone();
    let mut primary = Some(primary);
    let mut fallback = fallback;
    let mut phase = WritePhase::Dispatched;
    loop {
        phase = match phase {
            WritePhase::Dispatched => match primary.take() {
                Some(request) => {
                    debug!(method = %request.method, url = %request.url, "dispatching write");
                    match transport.send(request).await {
                        Ok(response) => after_primary(&response, fallback.take()),
                        Err(e) => WritePhase::Failed(e.into()),
                    }
                }
                None => WritePhase::Failed(ApiError::NoUrl),
            },
            WritePhase::AwaitingFollowUp { target } => {
                debug!(url = %target, "write acknowledged without body, reading it back");
                match transport.send(HttpRequest::get(target, headers.clone())).await {
                    Ok(response) => after_follow_up(&response),
                    Err(e) => WritePhase::Failed(e.into()),
                }
            }
            WritePhase::Resolved(body) => return Ok(body),
            WritePhase::Failed(e) => return Err(e),
        };
    }
}
