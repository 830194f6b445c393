//! Mapping CRUD verbs onto concrete HTTP requests.
//!
//! # Design
//! `map_request` is pure: configuration, verb, resource and options in, an
//! `HttpRequest` out. Legacy fallbacks are applied here:
//!
//! - method override: `PUT`/`DELETE` go out as `POST` with
//!   `X-HTTP-Method-Override` (and a `_method` field when the body is a form);
//! - form fallback: the JSON payload travels form-encoded as `model=<json>`.
//!
//! Headers passed in already hold the caller's overrides; computed headers
//! are only added when the caller did not set them.

use serde_json::Value;
use url::form_urlencoded;

use crate::config::SyncConfig;
use crate::error::{ApiError, ApiResult};
use crate::http::{
    default_header, HttpMethod, HttpRequest, CONTENT_TYPE, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE,
    METHOD_OVERRIDE,
};
use crate::options::{RequestOptions, Verb};
use crate::resource::{Resource, ResourceSet};
use crate::urls;

/// Form field carrying the payload when JSON bodies are disabled.
pub const FORM_MODEL_FIELD: &str = "model";
/// Form field carrying the real verb under method override.
pub const FORM_METHOD_FIELD: &str = "_method";

/// Build the request for `verb` on `entity`.
///
/// The payload is `options.body` when set, otherwise the entity's own
/// attributes; it is only read for verbs that carry one.
pub fn map_request<R: Resource>(
    config: &SyncConfig,
    verb: Verb,
    entity: &R,
    options: &RequestOptions,
    headers: Vec<(String, String)>,
) -> ApiResult<HttpRequest> {
    let url = urls::build_url(entity, options).ok_or(ApiError::NoUrl)?;
    let payload = if verb.has_body() {
        match &options.body {
            Some(body) => Some(body.clone()),
            None => Some(entity.to_payload()?),
        }
    } else {
        None
    };
    shape(config, verb, url, payload, options, headers)
}

/// Build the read request for `set`, or for the members identified by `ids`.
pub fn map_collection_request<S: ResourceSet>(
    config: &SyncConfig,
    set: &S,
    ids: &[String],
    options: &RequestOptions,
    headers: Vec<(String, String)>,
) -> ApiResult<HttpRequest> {
    let url = urls::build_collection_url(set, ids, options).ok_or(ApiError::NoUrl)?;
    shape(config, Verb::Read, url, None, options, headers)
}

fn shape(
    config: &SyncConfig,
    verb: Verb,
    url: String,
    payload: Option<Value>,
    options: &RequestOptions,
    mut headers: Vec<(String, String)>,
) -> ApiResult<HttpRequest> {
    let emulate_http = options.emulate_http.unwrap_or(config.emulate_http);
    let emulate_json = options.emulate_json.unwrap_or(config.emulate_json);

    let method = verb.method();
    let overridden = emulate_http && matches!(method, HttpMethod::Put | HttpMethod::Delete);

    let json = payload
        .map(|payload| {
            serde_json::to_string(&payload).map_err(|e| ApiError::Serialization(e.to_string()))
        })
        .transpose()?;

    let body = if emulate_json {
        let mut form = form_urlencoded::Serializer::new(String::new());
        if let Some(json) = &json {
            form.append_pair(FORM_MODEL_FIELD, json);
        }
        if overridden {
            form.append_pair(FORM_METHOD_FIELD, method.as_str());
        }
        if json.is_some() || overridden {
            default_header(&mut headers, CONTENT_TYPE, FORM_CONTENT_TYPE.to_string());
            Some(form.finish())
        } else {
            None
        }
    } else {
        if json.is_some() {
            default_header(&mut headers, CONTENT_TYPE, JSON_CONTENT_TYPE.to_string());
        }
        json
    };

    if overridden {
        default_header(&mut headers, METHOD_OVERRIDE, method.as_str().to_string());
    }

    Ok(HttpRequest {
        method: if overridden { HttpMethod::Post } else { method },
        url,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Record, RecordSet};
    use serde_json::json;

    fn widget() -> Record {
        Record::new()
            .with_attribute("pk", json!(42))
            .with_attribute("name", json!("sprocket"))
            .in_collection("/api/v1/widget/")
    }

    fn map(config: &SyncConfig, verb: Verb, options: &RequestOptions) -> HttpRequest {
        map_request(config, verb, &widget(), options, Vec::new()).unwrap()
    }

    #[test]
    fn read_is_a_bodiless_get() {
        let req = map(&SyncConfig::default(), Verb::Read, &RequestOptions::default());
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "/api/v1/widget/42/?limit=0&format=json");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn update_sends_json_attributes() {
        let req = map(&SyncConfig::default(), Verb::Update, &RequestOptions::default());
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.content_type(), Some("application/json"));
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"pk": 42, "name": "sprocket"}));
    }

    #[test]
    fn patch_goes_out_as_put() {
        let req = map(&SyncConfig::default(), Verb::Patch, &RequestOptions::default());
        assert_eq!(req.method, HttpMethod::Put);
        assert!(req.header(METHOD_OVERRIDE).is_none());
    }

    #[test]
    fn body_override_replaces_attributes() {
        let options = RequestOptions::new().with_body(json!({"name": "renamed"}));
        let req = map(&SyncConfig::default(), Verb::Patch, &options);
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "renamed"}));
    }

    #[test]
    fn override_mode_posts_delete() {
        let config = SyncConfig::new().with_emulate_http(true);
        let req = map(&config, Verb::Delete, &RequestOptions::default());
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("X-HTTP-Method-Override"), Some("DELETE"));
        assert!(req.body.is_none());
    }

    #[test]
    fn override_mode_leaves_get_and_post_alone() {
        let config = SyncConfig::new().with_emulate_http(true);
        assert_eq!(map(&config, Verb::Read, &RequestOptions::default()).method, HttpMethod::Get);
        let create = map(&config, Verb::Create, &RequestOptions::default());
        assert_eq!(create.method, HttpMethod::Post);
        assert!(create.header(METHOD_OVERRIDE).is_none());
    }

    #[test]
    fn form_mode_wraps_json_in_model_field() {
        let config = SyncConfig::new().with_emulate_json(true);
        let options = RequestOptions::new().with_body(json!({"name": "a b"}));
        let req = map(&config, Verb::Create, &options);
        assert_eq!(req.content_type(), Some("application/x-www-form-urlencoded"));
        assert_eq!(
            req.body.as_deref(),
            Some("model=%7B%22name%22%3A%22a+b%22%7D")
        );
    }

    #[test]
    fn form_and_override_add_method_field() {
        let config = SyncConfig::new().with_emulate_http(true).with_emulate_json(true);
        let put = map(&config, Verb::Update, &RequestOptions::new().with_body(json!({})));
        assert_eq!(put.method, HttpMethod::Post);
        assert_eq!(put.body.as_deref(), Some("model=%7B%7D&_method=PUT"));

        let delete = map(&config, Verb::Delete, &RequestOptions::default());
        assert_eq!(delete.body.as_deref(), Some("_method=DELETE"));
        assert_eq!(delete.content_type(), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn per_call_options_override_config() {
        let config = SyncConfig::new().with_emulate_http(true);
        let options = RequestOptions::new().with_emulate_http(false);
        assert_eq!(map(&config, Verb::Delete, &options).method, HttpMethod::Delete);
    }

    #[test]
    fn caller_content_type_is_kept() {
        let headers = vec![("content-type".to_string(), "application/vnd.api+json".to_string())];
        let req = map_request(
            &SyncConfig::default(),
            Verb::Update,
            &widget(),
            &RequestOptions::default(),
            headers,
        )
        .unwrap();
        assert_eq!(req.content_type(), Some("application/vnd.api+json"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn missing_url_is_reported() {
        let orphan = Record::new().with_attribute("pk", json!(1));
        let err = map_request(
            &SyncConfig::default(),
            Verb::Read,
            &orphan,
            &RequestOptions::default(),
            Vec::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::NoUrl));
    }

    #[test]
    fn collection_request_reads_subset() {
        let set = RecordSet::new("/api/v1/widget/");
        let ids = vec!["/api/v1/widget/1/".to_string(), "/api/v1/widget/2/".to_string()];
        let req = map_collection_request(
            &SyncConfig::new().with_emulate_http(true),
            &set,
            &ids,
            &RequestOptions::default(),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "/api/v1/widget/set/1;2/?limit=0&format=json");
    }
}
