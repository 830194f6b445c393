//! Client-side sync adapter for django-tastypie style REST APIs.
//!
//! # Overview
//! Translates CRUD operations on resources and resource sets into HTTP
//! requests and interprets the responses: `pk`-based URLs, `set/<ids>/`
//! multi-reads, sparse `fields`, `{"meta", "objects"}` envelopes and creates
//! that answer `201` without a body.
//!
//! # Design
//! - The host owns its models and implements [`Resource`] / [`ResourceSet`];
//!   [`Record`] / [`RecordSet`] cover hosts without a model layer.
//! - I/O goes through an injected [`Transport`]; request building and response
//!   parsing are plain functions over [`HttpRequest`] / [`HttpResponse`].
//! - [`TastypieClient`] carries its own [`SyncConfig`] and [`EventBus`], so
//!   independent clients can coexist.
//! - Empty write acknowledgements are followed by a read in
//!   [`two_phase`]; callers always observe a single result.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod events;
pub mod http;
pub mod options;
pub mod request;
pub mod resource;
pub mod transport;
pub mod two_phase;
pub mod types;
pub mod urls;

pub use client::TastypieClient;
pub use config::{ApiKey, SyncConfig};
pub use error::{ApiError, ApiResult, ErrorDetails, TransportError};
pub use events::{ApiErrorEvent, Event, EventBus};
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::{RequestOptions, Verb};
pub use resource::{Resource, ResourceSet, SparseFields};
pub use transport::{MockTransport, Transport};
pub use types::{Record, RecordSet};
