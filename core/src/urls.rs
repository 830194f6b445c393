//! URL construction for resources and resource sets.
//!
//! # Design
//! URLs are built from the `Resource` / `ResourceSet` capabilities only, so
//! the same inputs always yield the same string. `resource_url` is the
//! canonical location of a record (no query string); `build_url` and
//! `build_collection_url` add the query a request actually carries.
//!
//! Query values are percent-encoded except for the commas separating
//! `fields` names, which tastypie expects literally.

use url::form_urlencoded;

use crate::options::{RequestOptions, DEFAULT_FORMAT, DEFAULT_LIMIT};
use crate::resource::{Resource, ResourceSet};

/// Name of the identifier attribute, always requested with sparse fields.
pub const ID_FIELD: &str = "pk";

const FIELDS_PARAM: &str = "fields";

/// Append `/` unless `url` already ends with one. Empty input stays empty.
pub fn add_slash(url: &str) -> String {
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Canonical URL of `entity`: its root (or its collection's URL), then its pk.
pub fn resource_url<R: Resource>(entity: &R) -> Option<String> {
    let base = non_empty(entity.url_root()).or_else(|| non_empty(entity.collection_url()))?;
    let url = match entity.pk() {
        Some(pk) => format!("{}{pk}", add_slash(&base)),
        None => base,
    };
    Some(add_slash(&url))
}

/// URL of `set`, or of the subset identified by `ids` via `set/<id>;<id>/`.
///
/// Each id is reduced to the last segment of its path, so full resource URIs
/// and bare ids both work. Without its own root the set borrows the root of
/// its first member.
pub fn collection_url<S: ResourceSet>(set: &S, ids: &[String]) -> Option<String> {
    let base = non_empty(set.url_root()).or_else(|| {
        set.members()
            .first()
            .and_then(|member| non_empty(member.url_root()))
    })?;
    let mut url = add_slash(&base);

    let ids: Vec<&str> = ids.iter().filter_map(|id| last_segment(id)).collect();
    if !ids.is_empty() {
        url.push_str("set/");
        url.push_str(&ids.join(";"));
        url.push('/');
    }
    Some(url)
}

/// Request URL for `entity`: the explicit `options.url` or the resource URL,
/// plus the request query.
pub fn build_url<R: Resource>(entity: &R, options: &RequestOptions) -> Option<String> {
    let base = match non_empty(options.url.clone()) {
        Some(url) => url,
        None => resource_url(entity)?,
    };
    Some(request_url(&base, options))
}

/// Request URL for `set` (or its `ids` subset) plus the request query.
pub fn build_collection_url<S: ResourceSet>(
    set: &S,
    ids: &[String],
    options: &RequestOptions,
) -> Option<String> {
    let base = match non_empty(options.url.clone()) {
        Some(url) => url,
        None => collection_url(set, ids)?,
    };
    Some(request_url(&base, options))
}

/// Apply fields, pagination, format and caller parameters to `base`, in that
/// order. Later keys replace earlier ones, including keys already on `base`.
pub fn request_url(base: &str, options: &RequestOptions) -> String {
    let (path, mut query) = Query::split(base);
    if let Some(fields) = &options.fields {
        query.set(FIELDS_PARAM, normalize_fields(fields).join(","));
    }
    query.set("limit", options.limit.unwrap_or(DEFAULT_LIMIT).to_string());
    if let Some(offset) = options.offset {
        query.set("offset", offset.to_string());
    }
    query.set(
        "format",
        options.format.as_deref().unwrap_or(DEFAULT_FORMAT).to_string(),
    );
    for (key, value) in &options.url_params {
        query.set(key, value.clone());
    }
    query.render(path)
}

/// Set the `fields` parameter of `url` without touching anything else.
pub fn with_fields(url: &str, fields: &[String]) -> String {
    let (path, mut query) = Query::split(url);
    query.set(FIELDS_PARAM, normalize_fields(fields).join(","));
    query.render(path)
}

/// `fields` with [`ID_FIELD`] appended when missing.
pub fn normalize_fields(fields: &[String]) -> Vec<String> {
    let mut fields = fields.to_vec();
    if !fields.iter().any(|field| field == ID_FIELD) {
        fields.push(ID_FIELD.to_string());
    }
    fields
}

fn last_segment(id: &str) -> Option<&str> {
    id.split('/').filter(|part| !part.is_empty()).last()
}

fn non_empty(url: Option<String>) -> Option<String> {
    url.filter(|url| !url.is_empty())
}

/// Ordered query parameters; setting a key replaces it in place.
#[derive(Debug, Default)]
struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    fn split(url: &str) -> (&str, Self) {
        match url.split_once('?') {
            Some((path, query)) => (
                path,
                Self {
                    pairs: form_urlencoded::parse(query.as_bytes())
                        .into_owned()
                        .collect(),
                },
            ),
            None => (url, Self::default()),
        }
    }

    fn set(&mut self, key: &str, value: String) {
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.pairs[index].1 = value;
                let mut seen = 0;
                self.pairs.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    fn render(&self, path: &str) -> String {
        if self.pairs.is_empty() {
            return path.to_string();
        }
        let query = self
            .pairs
            .iter()
            .map(|(key, value)| format!("{}={}", encode(key), encode_value(key, value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{path}?{query}")
    }
}

fn encode(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn encode_value(key: &str, value: &str) -> String {
    if key == FIELDS_PARAM {
        value.split(',').map(encode).collect::<Vec<_>>().join(",")
    } else {
        encode(value)
    }
}
