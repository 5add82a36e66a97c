//! HTTP surface tests driven through the full router with a real (mocked)
//! backend, exercising bootstrap wiring end to end.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hobot_server::{AppState, build_router};
use hobot_settings::{BackendSettings, GatewaySettings};

fn backends(url: &str) -> BackendSettings {
    BackendSettings {
        monitoring: url.to_owned(),
        ehr: url.to_owned(),
        lis: url.to_owned(),
        pharmacy: url.to_owned(),
        radiology: url.to_owned(),
        bloodbank: url.to_owned(),
        erp: url.to_owned(),
        patient_services: url.to_owned(),
        timeout_secs: 5,
    }
}

fn gateway(backend_url: &str) -> (Router, AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = GatewaySettings::default();
    settings.storage.sessions_dir = dir.path().join("sessions").display().to_string();
    settings.storage.audit_db = dir.path().join("audit.db").display().to_string();
    settings.backends = backends(backend_url);
    let state = AppState::bootstrap(&settings, None).unwrap();
    (build_router(state.clone()), state, dir)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn chat_runs_a_turn_and_reuses_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vitals/P001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"heart_rate": 72})))
        .mount(&server)
        .await;

    let (app, _state, _dir) = gateway(&server.uri());
    let (status, body) = post_json(
        &app,
        "/chat",
        json!({"message": "vitals for P001", "user_id": "nurse_7"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let reply = body["response"].as_str().unwrap();
    assert!(reply.contains("get_vitals"));
    let session_id = body["session_id"].as_str().unwrap().to_owned();
    assert!(!session_id.is_empty());

    // Same session id round-trips.
    let (status, body) = post_json(
        &app,
        "/chat",
        json!({
            "message": "vitals for P001",
            "session_id": session_id,
            "user_id": "nurse_7",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], session_id);
}

#[tokio::test]
async fn critical_action_confirms_over_http_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/code-blue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "initiated"})))
        .expect(1)
        .mount(&server)
        .await;

    let (app, _state, _dir) = gateway(&server.uri());
    let (status, body) = post_json(
        &app,
        "/chat",
        json!({"message": "code blue for P001", "user_id": "nurse_7"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let reply = body["response"].as_str().unwrap();
    let confirmation_id = reply
        .lines()
        .find_map(|line| line.strip_prefix("Confirmation ID: "))
        .expect("reply should carry a confirmation id")
        .trim()
        .to_owned();

    let (status, body) = post_json(&app, &format!("/confirm/{confirmation_id}"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"], "initiated");

    // Consume-once: a second confirm is a 404.
    let (status, _) = post_json(&app, &format!("/confirm/{confirmation_id}"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_confirmation_is_not_found() {
    let (app, _state, _dir) = gateway("http://127.0.0.1:1");
    let (status, body) = post_json(&app, "/confirm/cfm_nope", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("cfm_nope"));
}

#[tokio::test]
async fn escalation_resolves_exactly_once() {
    let (app, state, _dir) = gateway("http://127.0.0.1:1");
    let (status, body) = post_json(
        &app,
        "/chat",
        json!({"message": "escalate P001 to icu consultant", "user_id": "nurse_7"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["response"].as_str().unwrap().contains("Escalation logged"));

    let escalation = state.audit.get_escalation(1).unwrap().unwrap();
    assert!(escalation.resolved_at.is_none());

    let (status, body) = post_json(
        &app,
        "/escalations/1/resolve",
        json!({"resolved_by": "charge_nurse", "resolution": "handled at bedside"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resolved");

    let escalation = state.audit.get_escalation(1).unwrap().unwrap();
    assert_eq!(escalation.resolved_by.as_deref(), Some("charge_nurse"));

    // Resolution is append-once.
    let (status, _) = post_json(
        &app,
        "/escalations/1/resolve",
        json!({"resolved_by": "someone_else", "resolution": "again"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_ok_when_all_backends_answer() {
    let server = MockServer::start().await;
    for health_path in ["/health", "/fhir/metadata", "/system"] {
        Mock::given(method("GET"))
            .and(path(health_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;
    }

    let (app, _state, _dir) = gateway(&server.uri());
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "hobot-gateway");
    assert_eq!(body["backends"]["monitoring"], "ok");
    assert_eq!(body["backends"]["ehr"], "ok");
}

#[tokio::test]
async fn health_reports_degraded_when_backends_are_down() {
    let (app, _state, _dir) = gateway("http://127.0.0.1:1");
    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(
        body["backends"]["monitoring"]
            .as_str()
            .unwrap()
            .starts_with("unreachable")
    );
}

#[tokio::test]
async fn chat_stream_emits_sse_ending_in_done() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vitals/P001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"heart_rate": 72})))
        .mount(&server)
        .await;

    let (app, _state, _dir) = gateway(&server.uri());
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat/stream")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({
                        "message": "vitals for P001",
                        "user_id": "nurse_7",
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert!(events.iter().any(|e| e["type"] == "tool_call"));
    assert!(events.iter().any(|e| e["type"] == "tool_result"));
    assert_eq!(events.last().unwrap()["type"], "done");
}
