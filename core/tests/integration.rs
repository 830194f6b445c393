//! Full sync lifecycle against the live mock server.
//!
//! # Design
//! Starts the mock tastypie API on a random port and drives every client
//! operation over real HTTP through a ureq-backed `Transport`. Validates that
//! URL building, two-phase writes, envelopes and legacy fallbacks agree with
//! an actual server.

use async_trait::async_trait;
use serde_json::json;
use tastypie_core::{
    ApiError, Event, HttpMethod, HttpRequest, HttpResponse, Record, RecordSet, RequestOptions,
    Resource, SyncConfig, TastypieClient, Transport, TransportError, Verb,
};

/// Blocking ureq agent run off the async executor.
///
/// Status codes are returned as data rather than errors so the client does
/// all status interpretation.
struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn execute(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, ureq::Error> {
    let mut response = match (req.method, req.body) {
        (HttpMethod::Get, _) => with_headers(agent.get(&req.url), &req.headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(&req.url), &req.headers).call(),
        (HttpMethod::Post, Some(body)) => {
            with_headers(agent.post(&req.url), &req.headers).send(body.as_bytes())
        }
        (HttpMethod::Post, None) => with_headers(agent.post(&req.url), &req.headers).send_empty(),
        (HttpMethod::Put, Some(body)) => {
            with_headers(agent.put(&req.url), &req.headers).send(body.as_bytes())
        }
        (HttpMethod::Put, None) => with_headers(agent.put(&req.url), &req.headers).send_empty(),
    }?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_string()?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute(&agent, request))
            .await
            .map_err(|e| TransportError::new(e.to_string()))?
            .map_err(|e| TransportError::new(e.to_string()))
    }
}

/// Start the mock server on a random port and return its widget root URL.
fn start_server(app: axum::Router) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, app).await
        })
        .unwrap();
    });

    format!("http://{addr}{}", mock_server::WIDGET_ROOT)
}

fn widget(root: &str, name: &str, quantity: i64) -> Record {
    Record::new()
        .with_url_root(root)
        .with_attribute("name", json!(name))
        .with_attribute("quantity", json!(quantity))
}

#[tokio::test]
async fn sync_lifecycle() {
    let root = start_server(mock_server::app());
    let client = TastypieClient::new(
        SyncConfig::new().with_get_after_empty_update(true),
        UreqTransport::new(),
    );
    let mut events = client.subscribe();

    // Step 1: create answers 201 without a body; the follow-up read fills it in.
    let mut sprocket = widget(&root, "Sprocket", 3);
    let created = client
        .save(&sprocket, RequestOptions::new())
        .await
        .unwrap()
        .expect("created widget is read back");
    assert_eq!(created["pk"], 1);
    assert_eq!(created["name"], "Sprocket");
    assert_eq!(created["resource_uri"], "/api/v1/widget/1/");
    sprocket.apply(&created);
    assert_eq!(sprocket.pk().as_deref(), Some("1"));

    // Step 2: sparse read returns only the requested fields plus pk.
    let partial = client
        .fetch(&sprocket, RequestOptions::new().with_fields(["name"]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partial, json!({"pk": 1, "name": "Sprocket"}));
    assert!(!sprocket.sparse_fields().is_active());

    // Step 3: update answers 204; read-back is enabled.
    sprocket.set("quantity", json!(9));
    let updated = client
        .save(&sprocket, RequestOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["quantity"], 9);

    // Step 4: a second widget, then a paginated collection read.
    let gear = client
        .save(&widget(&root, "Gear", 1), RequestOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(gear["pk"], 2);

    let mut all = RecordSet::new(&root);
    let page = client
        .fetch_collection(&mut all, RequestOptions::new().with_limit(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    let meta = all.meta().unwrap();
    assert_eq!(meta["total_count"], 2);
    assert_eq!(meta["limit"], 1);
    assert!(meta["next"].is_string());

    let objects = client
        .fetch_collection(&mut all, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(all.meta().unwrap()["limit"], 0);
    all.reset(objects).unwrap();
    assert_eq!(all.pks(), vec!["1".to_string(), "2".to_string()]);

    // Step 5: subset read through set/<ids>/.
    let subset = client
        .fetch_subset(
            &mut all,
            &["2".to_string(), "1".to_string()],
            RequestOptions::new().with_fields(["name"]),
        )
        .await
        .unwrap();
    assert_eq!(
        subset,
        vec![json!({"pk": 2, "name": "Gear"}), json!({"pk": 1, "name": "Sprocket"})]
    );

    // Step 6: delete through POST + method override with a form body.
    let deleted = client
        .destroy(
            &sprocket,
            RequestOptions::new()
                .with_emulate_http(true)
                .with_emulate_json(true),
        )
        .await
        .unwrap();
    assert!(deleted.is_none());
    assert!(events.try_recv().is_err(), "no failures so far");

    // Step 7: reading it again fails with 404 and publishes the failure.
    let err = client
        .fetch(&sprocket, RequestOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let Event::ApiError(event) = events.try_recv().unwrap();
    assert_eq!(event.verb, Verb::Read);
    assert_eq!(event.status, Some(404));
    assert_eq!(event.status_text, "Not Found");
    assert_eq!(event.pk.as_deref(), Some("1"));
    assert!(event.url.unwrap().contains("/api/v1/widget/1/"));

    // Step 8: only the second widget remains.
    let remaining = client
        .fetch_collection(&mut all, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["name"], "Gear");
}

#[tokio::test]
async fn emulated_update_sends_form_model() {
    let root = start_server(mock_server::app());
    let client = TastypieClient::new(
        SyncConfig::new()
            .with_emulate_http(true)
            .with_emulate_json(true)
            .with_get_after_empty_update(true),
        UreqTransport::new(),
    );

    let created = client
        .save(&widget(&root, "Flange", 2), RequestOptions::new())
        .await
        .unwrap()
        .unwrap();
    let mut flange = Record::from_value(created).unwrap().with_url_root(&root);
    flange.set("name", json!("Wide flange"));

    let updated = client
        .save(&flange, RequestOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["name"], "Wide flange");
    assert_eq!(updated["quantity"], 2);
}

#[tokio::test]
async fn update_without_read_back_resolves_empty() {
    let root = start_server(mock_server::app());
    let client = TastypieClient::new(SyncConfig::new(), UreqTransport::new());

    let created = client
        .save(&widget(&root, "Bolt", 5), RequestOptions::new())
        .await
        .unwrap()
        .unwrap();
    let bolt = Record::from_value(created).unwrap().with_url_root(&root);

    let result = client
        .sync(
            Verb::Update,
            &bolt,
            RequestOptions::new().with_body(json!({"quantity": 6})),
        )
        .await
        .unwrap();
    assert!(result.is_none());

    let fetched = client.fetch(&bolt, RequestOptions::new()).await.unwrap().unwrap();
    assert_eq!(fetched["quantity"], 6);
}

#[tokio::test]
async fn bad_payload_surfaces_error_message() {
    let root = start_server(mock_server::app());
    let client = TastypieClient::new(SyncConfig::new(), UreqTransport::new());
    let mut events = client.subscribe();

    let nameless = Record::new()
        .with_url_root(&root)
        .with_attribute("quantity", json!(1));
    let err = client
        .save(&nameless, RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    let message = err.details().error_message().unwrap().to_string();
    assert!(message.starts_with("invalid widget"), "{message}");

    let Event::ApiError(event) = events.try_recv().unwrap();
    assert_eq!(event.verb, Verb::Create);
    assert_eq!(event.details.error_message(), Some(message.as_str()));
}

#[tokio::test]
async fn api_key_authenticates_requests() {
    let root = start_server(mock_server::app_with_api_key("alice", "s3cret"));

    let anonymous = TastypieClient::new(SyncConfig::new(), UreqTransport::new());
    let mut set = RecordSet::new(&root);
    let err = anonymous
        .fetch_collection(&mut set, RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));

    let client = TastypieClient::new(
        SyncConfig::new().with_api_key("alice", "s3cret"),
        UreqTransport::new(),
    );
    let created = client
        .save(&widget(&root, "Cog", 1), RequestOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created["name"], "Cog");

    let objects = client
        .fetch_collection(&mut set, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(objects.len(), 1);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let client = TastypieClient::new(SyncConfig::new(), UreqTransport::new());
    let record = Record::new()
        .with_url_root("http://127.0.0.1:1/api/v1/widget/")
        .with_attribute("pk", json!(1));

    let err = client.fetch(&record, RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(err.status_text(), "error");
}
