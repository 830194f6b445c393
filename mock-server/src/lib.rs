use std::{collections::BTreeMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

pub const WIDGET_ROOT: &str = "/api/v1/widget/";
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Widget {
    pub pk: u64,
    pub resource_uri: String,
    pub name: String,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct CreateWidget {
    pub name: String,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateWidget {
    pub name: Option<String>,
    pub quantity: Option<i64>,
}

/// Query parameters understood by the widget endpoints. `format` and anything
/// else is accepted and ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub fields: Option<String>,
}

#[derive(Default)]
struct Store {
    next_pk: u64,
    widgets: BTreeMap<u64, Widget>,
}

#[derive(Clone, Default)]
pub struct AppState {
    store: Arc<RwLock<Store>>,
    authorization: Option<String>,
}

pub fn app() -> Router {
    router(AppState::default())
}

/// Like [`app`], but every request must carry `Authorization: ApiKey <username>:<key>`.
pub fn app_with_api_key(username: &str, key: &str) -> Router {
    router(AppState {
        authorization: Some(format!("ApiKey {username}:{key}")),
        ..AppState::default()
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(WIDGET_ROOT, get(list_widgets).post(create_widget))
        .route("/api/v1/widget/set/{ids}/", get(get_widget_set))
        .route(
            "/api/v1/widget/{pk}/",
            get(get_widget)
                .put(update_widget)
                .delete(delete_widget)
                .post(override_widget),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

/// Serve `app` (for instance one built by [`app_with_api_key`]) on `listener`.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, app).await
}

/// A failed request: a status and, for client errors, tastypie's JSON body.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    body: Option<Value>,
}

impl ApiFailure {
    fn status(status: StatusCode) -> Self {
        Self { status, body: None }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: Some(json!({ "error_message": message.into() })),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

type ApiResult<T> = Result<T, ApiFailure>;

async fn list_widgets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let store = state.store.read().await;
    let total = store.widgets.len();
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let page_size = if limit == 0 { total } else { limit };

    let fields = requested_fields(params.fields.as_deref());
    let objects: Vec<Value> = store
        .widgets
        .values()
        .skip(offset)
        .take(page_size)
        .map(|widget| render(widget, fields.as_deref()))
        .collect();

    let next_offset = offset.saturating_add(limit);
    let next = (limit != 0 && next_offset < total)
        .then(|| format!("{WIDGET_ROOT}?limit={limit}&offset={next_offset}"));
    let previous = (limit != 0 && offset > 0).then(|| {
        format!(
            "{WIDGET_ROOT}?limit={limit}&offset={}",
            offset.saturating_sub(limit)
        )
    });

    Ok(Json(json!({
        "meta": {
            "limit": limit,
            "offset": offset,
            "total_count": total,
            "next": next,
            "previous": previous,
        },
        "objects": objects,
    })))
}

async fn get_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pk): Path<u64>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let store = state.store.read().await;
    let widget = store
        .widgets
        .get(&pk)
        .ok_or(ApiFailure::status(StatusCode::NOT_FOUND))?;
    let fields = requested_fields(params.fields.as_deref());
    Ok(Json(render(widget, fields.as_deref())))
}

async fn get_widget_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ids): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let store = state.store.read().await;
    let fields = requested_fields(params.fields.as_deref());

    let mut objects = Vec::new();
    let mut not_found = Vec::new();
    for id in ids.split(';').filter(|id| !id.is_empty()) {
        match id.parse::<u64>().ok().and_then(|pk| store.widgets.get(&pk)) {
            Some(widget) => objects.push(render(widget, fields.as_deref())),
            None => not_found.push(id.to_string()),
        }
    }
    Ok(Json(json!({ "objects": objects, "not_found": not_found })))
}

/// Tastypie's default create: `201`, no body, the new resource in `Location`.
async fn create_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;
    let input: CreateWidget = decode(payload(&headers, &body)?)?;

    let mut store = state.store.write().await;
    store.next_pk += 1;
    let pk = store.next_pk;
    let widget = Widget {
        pk,
        resource_uri: format!("{WIDGET_ROOT}{pk}/"),
        name: input.name,
        quantity: input.quantity,
    };
    let location = match headers.get(header::HOST).and_then(|host| host.to_str().ok()) {
        Some(host) => format!("http://{host}{}", widget.resource_uri),
        None => widget.resource_uri.clone(),
    };
    debug!(pk, "created widget");
    store.widgets.insert(pk, widget);

    Ok((StatusCode::CREATED, [(header::LOCATION, location)]).into_response())
}

async fn update_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pk): Path<u64>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    apply_update(&state, pk, payload(&headers, &body)?).await
}

async fn delete_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pk): Path<u64>,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    apply_delete(&state, pk).await
}

/// `POST` to a detail URL carrying the real verb in `X-HTTP-Method-Override`
/// or, for form bodies, in a `_method` field.
async fn override_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pk): Path<u64>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    let method = headers
        .get("x-http-method-override")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| is_form(&headers).then(|| form_field(&body, "_method")).flatten())
        .map(|method| method.to_ascii_uppercase());

    match method.as_deref() {
        Some("PUT") => apply_update(&state, pk, payload(&headers, &body)?).await,
        Some("DELETE") => apply_delete(&state, pk).await,
        _ => Err(ApiFailure::status(StatusCode::METHOD_NOT_ALLOWED)),
    }
}

async fn apply_update(state: &AppState, pk: u64, payload: Value) -> ApiResult<StatusCode> {
    let input: UpdateWidget = decode(payload)?;
    let mut store = state.store.write().await;
    let widget = store
        .widgets
        .get_mut(&pk)
        .ok_or(ApiFailure::status(StatusCode::NOT_FOUND))?;
    if let Some(name) = input.name {
        widget.name = name;
    }
    if let Some(quantity) = input.quantity {
        widget.quantity = quantity;
    }
    debug!(pk, "updated widget");
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_delete(state: &AppState, pk: u64) -> ApiResult<StatusCode> {
    let mut store = state.store.write().await;
    store
        .widgets
        .remove(&pk)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiFailure::status(StatusCode::NOT_FOUND))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = &state.authorization else {
        return Ok(());
    };
    let given = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if given == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ApiFailure::status(StatusCode::UNAUTHORIZED))
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

fn form_field(body: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// The JSON payload of a write: the body itself, or the `model` field of a form.
fn payload(headers: &HeaderMap, body: &[u8]) -> ApiResult<Value> {
    let raw = if is_form(headers) {
        form_field(body, "model")
            .ok_or_else(|| ApiFailure::bad_request("form body has no model field"))?
    } else {
        String::from_utf8_lossy(body).into_owned()
    };
    serde_json::from_str(&raw).map_err(|e| ApiFailure::bad_request(format!("malformed payload: {e}")))
}

fn decode<T: DeserializeOwned>(payload: Value) -> ApiResult<T> {
    serde_json::from_value(payload).map_err(|e| ApiFailure::bad_request(format!("invalid widget: {e}")))
}

fn requested_fields(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|raw| {
        raw.split(',')
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn render(widget: &Widget, fields: Option<&[String]>) -> Value {
    let mut object = Map::new();
    object.insert("pk".to_string(), json!(widget.pk));
    object.insert("resource_uri".to_string(), json!(widget.resource_uri));
    object.insert("name".to_string(), json!(widget.name));
    object.insert("quantity".to_string(), json!(widget.quantity));
    if let Some(fields) = fields {
        object.retain(|key, _| fields.iter().any(|field| field == key));
    }
    Value::Object(object)
}
