//! Shared utilities for integration tests.

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use httpclient_gateway::config::GatewayConfig;
use httpclient_gateway::message::{Message, MessageHeaders};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Start an httpbin-like echo backend on an ephemeral port.
///
/// - `GET /get` echoes url, headers and query args
/// - `ANY /status/{code}` answers with that status and an empty body
/// - `POST /post` echoes form fields (multipart) or the raw body under `data`
pub async fn start_echo_backend() -> SocketAddr {
    let app = Router::new()
        .route("/get", get(echo_get))
        .route("/status/{code}", any(status))
        .route("/post", post(echo_post));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo_get(uri: Uri, headers: HeaderMap, Query(args): Query<HashMap<String, String>>) -> Json<Value> {
    let headers: Map<String, Value> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), Value::String(v.to_str().ok()?.to_string()))))
        .collect();
    Json(json!({
        "url": uri.to_string(),
        "origin": "127.0.0.1",
        "headers": headers,
        "args": args,
    }))
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Body::empty()).into_response()
}

async fn echo_post(request: Request) -> Response {
    let multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("multipart/form-data"));

    if multipart {
        let mut form = match Multipart::from_request(request, &()).await {
            Ok(form) => form,
            Err(rejection) => return rejection.into_response(),
        };
        let mut data = Map::new();
        while let Ok(Some(field)) = form.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            let text = field.text().await.unwrap_or_default();
            data.insert(name, Value::String(text));
        }
        Json(json!({ "data": data })).into_response()
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        Json(json!({
            "data": String::from_utf8_lossy(&bytes),
            "size": bytes.len(),
        }))
        .into_response()
    }
}

/// A config pointing at `backend`, fast enough for tests.
pub fn config_for(backend: SocketAddr) -> GatewayConfig {
    GatewayConfig {
        url: Some(format!("http://{}", backend)),
        request_per_second: 50.0,
        resource_location_uri: "file://tmp/{key}{extension}".into(),
        resource_root: concat!(env!("CARGO_MANIFEST_DIR"), "/tests").into(),
        content_length_to_externalize: Some(1_000_000),
        ..GatewayConfig::default()
    }
}

pub fn request(id: &str, method: &str, url: &str) -> Message {
    let headers: MessageHeaders = [
        ("continuation_id", id),
        ("http_requestMethod", method),
        ("http_requestUrl", url),
    ]
    .into_iter()
    .collect();
    Message::empty(headers)
}

/// Receive one message or fail after a few seconds.
pub async fn recv(rx: &mut mpsc::Receiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}
