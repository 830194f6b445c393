//! Capabilities the host's entity and collection types provide.
//!
//! # Design
//! The adapter never reaches into the host framework. Host types implement
//! `Resource` (one record) and `ResourceSet` (an ordered group of records),
//! and the URL builder and sync entry points work against those traits only.
//! [`Record`](crate::Record) and [`RecordSet`](crate::RecordSet) are
//! JSON-backed implementations for hosts without their own model layer.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::options::Verb;

/// A single addressable record.
pub trait Resource {
    /// The `pk` of the record, if it has been saved. May be a bare id (`"42"`)
    /// or a full resource URI (`"/api/v1/widget/42/"`).
    fn pk(&self) -> Option<String>;

    /// Root URL declared by the record itself.
    fn url_root(&self) -> Option<String> {
        None
    }

    /// URL of the owning collection. Used only to resolve this record's URL.
    fn collection_url(&self) -> Option<String> {
        None
    }

    /// The attributes sent as the payload of create and update calls.
    fn to_payload(&self) -> ApiResult<Value>;

    /// Slot recording the sparse fields of in-flight requests.
    fn sparse_fields(&self) -> &SparseFields;

    /// Called once per sync, right before the request is sent.
    fn on_request(&self, _verb: Verb) {}
}

/// An ordered group of records sharing a base URL.
pub trait ResourceSet {
    type Member: Resource;

    fn url_root(&self) -> Option<String> {
        None
    }

    fn members(&self) -> &[Self::Member];

    /// Replace the metadata of the most recent read.
    fn set_meta(&mut self, meta: Value);

    fn sparse_fields(&self) -> &SparseFields;

    fn on_request(&self, _verb: Verb) {}
}

/// Sparse fields currently requested on behalf of a resource.
///
/// Populated for the duration of a sync call that asks for fields and cleared
/// when the call settles. Cloning yields an empty slot.
#[derive(Debug, Default)]
pub struct SparseFields {
    active: Mutex<Option<Vec<String>>>,
}

impl SparseFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Vec<String>> {
        self.active.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Record `fields` until the returned guard drops.
    ///
    /// Overlapping calls with their own fields overwrite each other; the later
    /// one wins and a warning is logged.
    pub(crate) fn activate(&self, fields: Vec<String>, label: &str) -> FieldsGuard<'_> {
        let mut active = self.active.lock();
        if let Some(previous) = active.as_ref() {
            warn!(
                resource = label,
                previous = %previous.join(","),
                next = %fields.join(","),
                "overwriting sparse fields; concurrent requests with different fields on one resource"
            );
        }
        *active = Some(fields);
        FieldsGuard {
            slot: self,
            label: label.to_string(),
        }
    }

    fn clear(&self, label: &str) {
        if let Some(fields) = self.active.lock().take() {
            debug!(resource = label, fields = %fields.join(","), "cleared sparse fields");
        }
    }
}

impl Clone for SparseFields {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// Clears a [`SparseFields`] slot when the call it belongs to settles or is dropped.
pub(crate) struct FieldsGuard<'a> {
    slot: &'a SparseFields,
    label: String,
}

impl Drop for FieldsGuard<'_> {
    fn drop(&mut self) {
        self.slot.clear(&self.label);
    }
}
