//! Sync entry point for tastypie resources.
//!
//! # Design
//! `TastypieClient` owns its configuration, its transport and the event bus
//! it reports failures to; nothing is process-global. Each sync call:
//!
//! 1. records requested sparse fields on the resource for the call's lifetime,
//! 2. merges auth/CSRF headers with the caller's headers,
//! 3. maps the verb to an `HttpRequest`,
//! 4. sends it, through the two-phase protocol when the verb asks for it,
//! 5. unwraps the response, or publishes the failure and returns it.
//!
//! The returned future is the handle of the whole logical operation: it
//! settles after the follow-up read when there is one. `build_request` and
//! `build_collection_request` expose step 3 without any I/O.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::config::SyncConfig;
use crate::envelope::{decode_body, parse_collection, parse_entity};
use crate::error::{ApiError, ApiResult};
use crate::events::{ApiErrorEvent, Event, EventBus};
use crate::http::{merge_headers, HttpRequest, HttpResponse};
use crate::options::{RequestOptions, Verb};
use crate::request::{map_collection_request, map_request};
use crate::resource::{Resource, ResourceSet};
use crate::transport::Transport;
use crate::two_phase;
use crate::urls::{normalize_fields, resource_url};

/// Client translating CRUD calls on resources into tastypie HTTP requests.
#[derive(Debug)]
pub struct TastypieClient<T> {
    config: SyncConfig,
    transport: T,
    events: EventBus,
}

impl<T: Transport> TastypieClient<T> {
    pub fn new(config: SyncConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            events: EventBus::default(),
        }
    }

    /// Report failures to `events` instead of a private bus.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// The request `sync(verb, entity, options)` would send first.
    pub fn build_request<R: Resource>(
        &self,
        verb: Verb,
        entity: &R,
        options: &RequestOptions,
    ) -> ApiResult<HttpRequest> {
        map_request(&self.config, verb, entity, options, self.headers(options))
    }

    /// The read request for `set`, or for the members identified by `ids`.
    pub fn build_collection_request<S: ResourceSet>(
        &self,
        set: &S,
        ids: &[String],
        options: &RequestOptions,
    ) -> ApiResult<HttpRequest> {
        map_collection_request(&self.config, set, ids, options, self.headers(options))
    }

    /// Perform `verb` on `entity`.
    ///
    /// Resolves with the unwrapped representation returned by the server, or
    /// `None` when it answered without a body (deletes, updates without
    /// read-back).
    pub async fn sync<R: Resource>(
        &self,
        verb: Verb,
        entity: &R,
        options: RequestOptions,
    ) -> ApiResult<Option<Value>> {
        let label = entity.pk().unwrap_or_else(|| "new".to_string());
        let _fields = options
            .fields
            .as_ref()
            .map(|fields| entity.sparse_fields().activate(normalize_fields(fields), &label));

        let (url, result) = match self.build_request(verb, entity, &options) {
            Ok(request) => {
                entity.on_request(verb);
                let url = request.url.clone();
                (Some(url), self.execute(verb, entity, request).await)
            }
            Err(e) => (None, Err(e)),
        };

        match result {
            Ok(body) => Ok(body.map(parse_entity)),
            Err(e) => Err(self.report(verb, url, entity.pk(), e)),
        }
    }

    pub async fn fetch<R: Resource>(
        &self,
        entity: &R,
        options: RequestOptions,
    ) -> ApiResult<Option<Value>> {
        self.sync(Verb::Read, entity, options).await
    }

    /// Create `entity` when it has no pk yet, update it otherwise.
    pub async fn save<R: Resource>(
        &self,
        entity: &R,
        options: RequestOptions,
    ) -> ApiResult<Option<Value>> {
        let verb = if entity.pk().is_some() {
            Verb::Update
        } else {
            Verb::Create
        };
        self.sync(verb, entity, options).await
    }

    pub async fn destroy<R: Resource>(
        &self,
        entity: &R,
        options: RequestOptions,
    ) -> ApiResult<Option<Value>> {
        self.sync(Verb::Delete, entity, options).await
    }

    /// Read the whole collection. Metadata in the response replaces `set`'s.
    pub async fn fetch_collection<S: ResourceSet>(
        &self,
        set: &mut S,
        options: RequestOptions,
    ) -> ApiResult<Vec<Value>> {
        self.read_set(set, &[], options).await
    }

    /// Read the members identified by `ids` in one `set/<id>;<id>/` request.
    pub async fn fetch_subset<S: ResourceSet>(
        &self,
        set: &mut S,
        ids: &[String],
        options: RequestOptions,
    ) -> ApiResult<Vec<Value>> {
        self.read_set(set, ids, options).await
    }

    /// Re-read the current members of `set` by their pks.
    pub async fn fetch_members<S: ResourceSet>(
        &self,
        set: &mut S,
        options: RequestOptions,
    ) -> ApiResult<Vec<Value>> {
        let ids: Vec<String> = set.members().iter().filter_map(|m| m.pk()).collect();
        self.read_set(set, &ids, options).await
    }

    async fn read_set<S: ResourceSet>(
        &self,
        set: &mut S,
        ids: &[String],
        options: RequestOptions,
    ) -> ApiResult<Vec<Value>> {
        let (url, result) = {
            let _fields = options.fields.as_ref().map(|fields| {
                set.sparse_fields()
                    .activate(normalize_fields(fields), "collection")
            });
            match self.build_collection_request(&*set, ids, &options) {
                Ok(request) => {
                    set.on_request(Verb::Read);
                    let url = request.url.clone();
                    (Some(url), self.dispatch(request).await)
                }
                Err(e) => (None, Err(e)),
            }
        };

        match result {
            Ok(body) => Ok(body
                .map(|raw| parse_collection(set, raw))
                .unwrap_or_default()),
            Err(e) => Err(self.report(Verb::Read, url, None, e)),
        }
    }

    fn headers(&self, options: &RequestOptions) -> Vec<(String, String)> {
        merge_headers(self.config.auth_headers(), &options.headers)
    }

    async fn execute<R: Resource>(
        &self,
        verb: Verb,
        entity: &R,
        request: HttpRequest,
    ) -> ApiResult<Option<Value>> {
        if self.config.follows_empty_write(verb) {
            two_phase::run(&self.transport, request, follow_up_fallback(entity)).await
        } else {
            self.dispatch(request).await
        }
    }

    async fn dispatch(&self, request: HttpRequest) -> ApiResult<Option<Value>> {
        debug!(method = %request.method, url = %request.url, "dispatching request");
        let response = self.transport.send(request).await?;
        check_status(&response)?;
        decode_body(&response)
    }

    /// Log `error`, publish it, and hand it back for the caller.
    fn report(
        &self,
        verb: Verb,
        url: Option<String>,
        pk: Option<String>,
        error: ApiError,
    ) -> ApiError {
        let details = error.details();
        match details.error_message() {
            Some(message) => error!(%verb, url = ?url, "Error message: {message}"),
            None => warn!(%verb, url = ?url, %error, "sync failed"),
        }
        if let Some(traceback) = details.traceback() {
            debug!(%verb, "server traceback:\n{traceback}");
        }
        self.events
            .emit(Event::ApiError(ApiErrorEvent::new(verb, url, pk, &error)));
        error
    }
}

/// Map non-success status codes to `ApiError::Http`.
fn check_status(response: &HttpResponse) -> ApiResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ApiError::from_response(response))
    }
}

/// Read-back target when a write is acknowledged without `Location`: the pk
/// itself when it is a resource URI, else the entity's URL. Unsaved entities
/// have none.
fn follow_up_fallback<R: Resource>(entity: &R) -> Option<String> {
    let pk = entity.pk()?;
    if pk.starts_with('/') || pk.contains("://") {
        Some(pk)
    } else {
        resource_url(entity)
    }
}
