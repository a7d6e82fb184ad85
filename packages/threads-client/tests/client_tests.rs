//! Wire-format tests against a local axum stand-in for the Graph API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use threads_client::{ContainerRequest, ContainerStatus, ThreadsClient, ThreadsError};

#[derive(Clone, Default)]
struct Recorded {
    forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn create_container(
    State(rec): State<Recorded>,
    Path(user): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    rec.forms.lock().unwrap().push(form.clone());
    if user == "broken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "invalid user"}})),
        );
    }
    if user == "empty" {
        return (StatusCode::OK, Json(json!({})));
    }
    (StatusCode::OK, Json(json!({"id": "container-1"})))
}

async fn container_status(
    State(rec): State<Recorded>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    rec.queries.lock().unwrap().push(query);
    match id.as_str() {
        "failing" => Json(json!({"status": "ERROR", "error_message": "unsupported image"})),
        "pending" => Json(json!({"status": "IN_PROGRESS"})),
        _ => Json(json!({"status": "FINISHED", "id": id})),
    }
}

async fn publish(
    State(rec): State<Recorded>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    rec.forms.lock().unwrap().push(form);
    Json(json!({"id": "post-9"}))
}

async fn refresh(
    State(rec): State<Recorded>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    rec.queries.lock().unwrap().push(query);
    Json(json!({"access_token": "fresh", "token_type": "bearer", "expires_in": 5184000}))
}

async fn spawn_server() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/v1.0/:id/threads", post(create_container))
        .route("/v1.0/:id/threads_publish", post(publish))
        .route("/v1.0/:id", get(container_status))
        .route("/refresh_access_token", get(refresh))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), recorded)
}

#[tokio::test]
async fn carousel_item_container_sends_expected_form() {
    let (base, rec) = spawn_server().await;
    let client = ThreadsClient::new().with_base_url(base);

    let id = client
        .create_container(
            "me",
            "token-1",
            &ContainerRequest::carousel_item("https://img.example/i/a.jpg"),
        )
        .await
        .unwrap();

    assert_eq!(id, "container-1");
    let forms = rec.forms.lock().unwrap();
    let form = &forms[0];
    assert_eq!(form.get("media_type").map(String::as_str), Some("IMAGE"));
    assert_eq!(form.get("is_carousel_item").map(String::as_str), Some("true"));
    assert_eq!(
        form.get("image_url").map(String::as_str),
        Some("https://img.example/i/a.jpg")
    );
    assert_eq!(form.get("access_token").map(String::as_str), Some("token-1"));
    assert!(form.get("text").is_none());
}

#[tokio::test]
async fn text_is_form_encoded_verbatim() {
    let (base, rec) = spawn_server().await;
    let client = ThreadsClient::new().with_base_url(base);
    let text = "New document: Car 44 - Offence & Penalty\n\nAI Summary: 5s + grid drop";

    client
        .create_container("me", "t", &ContainerRequest::text(text))
        .await
        .unwrap();

    let forms = rec.forms.lock().unwrap();
    assert_eq!(forms[0].get("text").map(String::as_str), Some(text));
    assert_eq!(forms[0].get("media_type").map(String::as_str), Some("TEXT"));
}

#[tokio::test]
async fn api_error_surfaces_status_and_body() {
    let (base, _rec) = spawn_server().await;
    let client = ThreadsClient::new().with_base_url(base);

    let err = client
        .create_container("broken", "t", &ContainerRequest::text("x"))
        .await
        .unwrap_err();

    match err {
        ThreadsError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("invalid user"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_id_is_an_error() {
    let (base, _rec) = spawn_server().await;
    let client = ThreadsClient::new().with_base_url(base);

    let err = client
        .create_container("empty", "t", &ContainerRequest::text("x"))
        .await
        .unwrap_err();

    assert!(matches!(err, ThreadsError::EmptyId));
}

#[tokio::test]
async fn container_status_is_parsed() {
    let (base, rec) = spawn_server().await;
    let client = ThreadsClient::new().with_base_url(base);

    assert_eq!(
        client.container_status("ok-1", "t").await.unwrap(),
        ContainerStatus::Finished
    );
    assert_eq!(
        client.container_status("pending", "t").await.unwrap(),
        ContainerStatus::InProgress
    );
    assert_eq!(
        client.container_status("failing", "t").await.unwrap(),
        ContainerStatus::Error(Some("unsupported image".to_string()))
    );

    let queries = rec.queries.lock().unwrap();
    assert_eq!(
        queries[0].get("fields").map(String::as_str),
        Some("status,error_message")
    );
}

#[tokio::test]
async fn publish_and_refresh_round_trip() {
    let (base, rec) = spawn_server().await;
    let client = ThreadsClient::new().with_base_url(base);

    let post_id = client.publish("me", "t", "container-1").await.unwrap();
    assert_eq!(post_id, "post-9");
    assert_eq!(
        rec.forms.lock().unwrap()[0]
            .get("creation_id")
            .map(String::as_str),
        Some("container-1")
    );

    let token = client.refresh_token("old").await.unwrap();
    assert_eq!(token.access_token, "fresh");
    assert_eq!(token.expires_in, 5184000);
    let queries = rec.queries.lock().unwrap();
    assert_eq!(
        queries[0].get("grant_type").map(String::as_str),
        Some("th_refresh_token")
    );
    assert_eq!(queries[0].get("access_token").map(String::as_str), Some("old"));
}
