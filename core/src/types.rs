//! JSON-backed records and record sets.
//!
//! # Design
//! Attributes are kept as a `serde_json::Map` so any tastypie resource can be
//! mirrored without a schema. Hosts with typed models implement
//! [`Resource`] / [`ResourceSet`] on their own types instead.

use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::resource::{Resource, ResourceSet, SparseFields};
use crate::urls::ID_FIELD;

/// A single resource mirrored as a JSON object.
#[derive(Debug, Clone, Default)]
pub struct Record {
    attributes: Map<String, Value>,
    url_root: Option<String>,
    collection_url: Option<String>,
    fields: SparseFields,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a decoded object. Non-objects yield `Deserialization`.
    pub fn from_value(value: Value) -> ApiResult<Self> {
        match value {
            Value::Object(attributes) => Ok(Self {
                attributes,
                ..Self::default()
            }),
            other => Err(ApiError::Deserialization(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    pub fn with_url_root(mut self, url_root: impl Into<String>) -> Self {
        self.url_root = Some(url_root.into());
        self
    }

    /// Attach the record to a collection living at `url`.
    pub fn in_collection(mut self, url: impl Into<String>) -> Self {
        self.collection_url = Some(url.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Merge a server representation into the attributes. Keys missing from
    /// `value` are left untouched; non-object values are ignored.
    pub fn apply(&mut self, value: &Value) {
        if let Value::Object(incoming) = value {
            for (key, value) in incoming {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
    }
}

impl Resource for Record {
    fn pk(&self) -> Option<String> {
        match self.attributes.get(ID_FIELD)? {
            Value::String(pk) if !pk.is_empty() => Some(pk.clone()),
            Value::Number(pk) => Some(pk.to_string()),
            _ => None,
        }
    }

    fn url_root(&self) -> Option<String> {
        self.url_root.clone()
    }

    fn collection_url(&self) -> Option<String> {
        self.collection_url.clone()
    }

    fn to_payload(&self) -> ApiResult<Value> {
        Ok(Value::Object(self.attributes.clone()))
    }

    fn sparse_fields(&self) -> &SparseFields {
        &self.fields
    }
}

/// An ordered collection of [`Record`]s.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    url_root: Option<String>,
    members: Vec<Record>,
    meta: Option<Value>,
    fields: SparseFields,
}

impl RecordSet {
    pub fn new(url_root: impl Into<String>) -> Self {
        Self {
            url_root: Some(url_root.into()),
            ..Self::default()
        }
    }

    /// A set without its own root; its URL comes from its first member.
    pub fn from_members(members: Vec<Record>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    /// Add a member, attaching it to this set's URL when the set has one.
    pub fn push(&mut self, record: Record) {
        let record = match &self.url_root {
            Some(url) if record.collection_url.is_none() => record.in_collection(url.clone()),
            _ => record,
        };
        self.members.push(record);
    }

    /// Replace all members with records decoded from `objects`.
    pub fn reset(&mut self, objects: Vec<Value>) -> ApiResult<()> {
        let records = objects
            .into_iter()
            .map(Record::from_value)
            .collect::<ApiResult<Vec<_>>>()?;
        self.members.clear();
        for record in records {
            self.push(record);
        }
        Ok(())
    }

    /// Metadata of the most recent read, e.g. tastypie's pagination counters.
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Primary keys of the members that have one, in order.
    pub fn pks(&self) -> Vec<String> {
        self.members.iter().filter_map(|m| m.pk()).collect()
    }
}

impl ResourceSet for RecordSet {
    type Member = Record;

    fn url_root(&self) -> Option<String> {
        self.url_root.clone()
    }

    fn members(&self) -> &[Record] {
        &self.members
    }

    fn set_meta(&mut self, meta: Value) {
        self.meta = Some(meta);
    }

    fn sparse_fields(&self) -> &SparseFields {
        &self.fields
    }
}
