//! End-to-end exchanges against a local echo backend.

mod common;

use common::{config_for, recv, request, start_echo_backend};
use httpclient_gateway::config::GatewayConfig;
use httpclient_gateway::gateway::Gateway;
use httpclient_gateway::lifecycle::Shutdown;
use httpclient_gateway::message::{Message, MessageHeaders};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

fn json(message: &Message) -> Value {
    serde_json::from_slice(&message.payload).expect("payload should be JSON")
}

fn start(config: &GatewayConfig) -> (httpclient_gateway::RunningGateway, Shutdown) {
    let shutdown = Shutdown::new();
    let gateway = Gateway::from_config(config).expect("gateway should build");
    (gateway.start(shutdown.subscribe()), shutdown)
}

#[tokio::test]
async fn test_successful_get_is_passed_through_with_analytics() {
    let backend = start_echo_backend().await;
    let (mut running, _shutdown) = start(&config_for(backend));

    running
        .input
        .send(request("1234", "GET", "http://some.domain/get?foo=1&bar=2"))
        .await
        .unwrap();

    let output = recv(&mut running.sinks.output).await;
    assert_eq!(output.continuation_id().as_deref(), Some("1234"));
    assert_eq!(output.headers.get_str("http_requestMethod").as_deref(), Some("GET"));
    assert!(!output.headers.contains("http_statusCode"));
    let body = json(&output);
    assert_eq!(body["args"]["foo"], "1");
    assert_eq!(body["args"]["bar"], "2");

    let analytics = recv(&mut running.sinks.analytics).await;
    assert!(analytics.payload.is_empty());
    assert_eq!(analytics.headers.get_str("request_id").as_deref(), Some("1234"));
    assert_eq!(analytics.headers.get_str("http_method").as_deref(), Some("GET"));
    assert_eq!(analytics.headers.get_u16("status_code"), Some(200));
    assert_eq!(analytics.headers.get_str("host").as_deref(), Some("127.0.0.1"));
    assert_eq!(analytics.headers.get_str("path").as_deref(), Some("/get"));
    assert_eq!(analytics.headers.get_str("query").as_deref(), Some("foo=1&bar=2"));
    assert!(!analytics.headers.contains("reason_phrase"));
    assert!(analytics.headers.contains("response_timestamp"));
}

#[tokio::test]
async fn test_forbidden_is_terminal() {
    let backend = start_echo_backend().await;
    let (mut running, _shutdown) = start(&config_for(backend));

    running
        .input
        .send(request("5678", "GET", "http://some.domain/status/403"))
        .await
        .unwrap();

    let output = recv(&mut running.sinks.output).await;
    assert_eq!(output.continuation_id().as_deref(), Some("5678"));
    assert_eq!(output.headers.get_u16("http_statusCode"), Some(403));
    assert!(output.headers.contains("error_response_time"));
    assert!(!output.headers.contains("http_reasonPhrase"));
    assert!(!output.headers.contains("original_content_type"));

    let analytics = recv(&mut running.sinks.analytics).await;
    assert_eq!(analytics.headers.get_u16("status_code"), Some(403));
    assert_eq!(analytics.headers.get_str("reason_phrase").as_deref(), Some("Forbidden"));
    assert_eq!(analytics.headers.get_str("path").as_deref(), Some("/status/403"));
    assert!(!analytics.headers.contains("query"));
}

#[tokio::test]
async fn test_retryable_status_goes_to_feedback_only() {
    let backend = start_echo_backend().await;
    let config = GatewayConfig {
        retry_error_status_codes: vec![429, 500],
        retry_url_regex: Some(r"^.+/500$".into()),
        ..config_for(backend)
    };
    let (mut running, _shutdown) = start(&config);

    let mut retried = request("1234", "GET", "http://some.domain/status/500");
    retried.headers.insert("tenant", "acme");
    running.input.send(retried).await.unwrap();

    let feedback = recv(&mut running.sinks.retry_feedback).await;
    assert_eq!(feedback.continuation_id().as_deref(), Some("1234"));
    assert_eq!(feedback.headers.get_u16("http_statusCode"), Some(500));
    assert_eq!(feedback.headers.get_str("tenant").as_deref(), Some("acme"));

    // 429 is in the status set but its URL does not match the regex
    running
        .input
        .send(request("5678", "GET", "http://some.domain/status/429"))
        .await
        .unwrap();
    let output = recv(&mut running.sinks.output).await;
    assert_eq!(output.continuation_id().as_deref(), Some("5678"));
    assert_eq!(output.headers.get_u16("http_statusCode"), Some(429));

    let analytics = recv(&mut running.sinks.analytics).await;
    assert_eq!(analytics.headers.get_str("request_id").as_deref(), Some("5678"));

    drop(running.input);
    running.task.await.unwrap();
    assert!(running.sinks.analytics.recv().await.is_none());
    assert!(running.sinks.output.recv().await.is_none());
}

#[tokio::test]
async fn test_transport_failure_signals_retry() {
    let backend = start_echo_backend().await;
    let config = GatewayConfig {
        url: Some("http://127.0.0.1:9".into()),
        ..config_for(backend)
    };
    let (mut running, _shutdown) = start(&config);

    running
        .input
        .send(request("down-1", "GET", "http://some.domain/get"))
        .await
        .unwrap();

    let feedback = recv(&mut running.sinks.retry_feedback).await;
    assert_eq!(feedback.continuation_id().as_deref(), Some("down-1"));
    assert!(feedback.headers.contains("transport_error"));
    assert!(!feedback.headers.contains("http_statusCode"));

    drop(running.input);
    running.task.await.unwrap();
    assert!(running.sinks.analytics.recv().await.is_none());
}

#[tokio::test]
async fn test_multipart_form_is_assembled() {
    let backend = start_echo_backend().await;
    let (mut running, _shutdown) = start(&config_for(backend));

    let mut message = request("mp-1", "POST", "http://some.domain/post");
    message.headers.insert("original_content_type", "multipart/form-data");
    message.payload = serde_json::json!([
        {"some-number": 4},
        {"some-string": "str1"},
        {"some-boolean": true},
        {"some-object": {"a": 1}},
        {"formParameterName": "data1",
         "originalFileName": "filename.txt",
         "contentType": "text/plain",
         "uri": "classpath:128b_file"},
        {"formParameterName": "data2",
         "originalFileName": "inline.txt",
         "contentType": "text/plain",
         "value": "inline content"}
    ])
    .to_string()
    .into();
    running.input.send(message).await.unwrap();

    let output = recv(&mut running.sinks.output).await;
    assert!(!output.headers.contains("http_statusCode"));
    let data = &json(&output)["data"];
    assert_eq!(data.as_object().map(|m| m.len()), Some(6));
    assert_eq!(data["some-number"], "4");
    assert_eq!(data["some-string"], "str1");
    assert_eq!(data["some-boolean"], "true");
    assert_eq!(data["some-object"], r#"{"a":1}"#);
    assert_eq!(data["data1"].as_str().map(str::len), Some(128));
    assert_eq!(data["data2"], "inline content");
}

#[tokio::test]
async fn test_missing_multipart_resource_is_rejected_without_dispatch() {
    let backend = start_echo_backend().await;
    let (mut running, _shutdown) = start(&config_for(backend));

    let mut message = request("mp-2", "POST", "http://some.domain/post");
    message.headers.insert("original_content_type", "multipart/form-data");
    message.payload = serde_json::json!([
        {"formParameterName": "data1", "uri": "classpath:does-not-exist"}
    ])
    .to_string()
    .into();
    running.input.send(message).await.unwrap();

    let output = recv(&mut running.sinks.output).await;
    assert_eq!(output.continuation_id().as_deref(), Some("mp-2"));
    assert!(output.headers.contains("error_message"));

    drop(running.input);
    running.task.await.unwrap();
    assert!(running.sinks.analytics.recv().await.is_none());
}

#[tokio::test]
async fn test_pattern_match_externalizes_to_deterministic_location() {
    let backend = start_echo_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        url_patterns_to_externalize: vec!["/post".into()],
        resource_root: dir.path().to_string_lossy().into_owned(),
        ..config_for(backend)
    };
    let (mut running, _shutdown) = start(&config);

    let mut uris = Vec::new();
    for id in ["ext-1", "ext-2"] {
        let mut message = request(id, "POST", "http://some.domain/post");
        message.payload = r#"{"hello":"world"}"#.into();
        running.input.send(message).await.unwrap();

        let output = recv(&mut running.sinks.output).await;
        assert_eq!(output.continuation_id().as_deref(), Some(id));
        assert_eq!(output.headers.get_str("contentType").as_deref(), Some("application/json"));
        let content = json(&output);
        assert_eq!(content["http_requestUrl"], "http://some.domain/post");
        assert_eq!(content["original_content_type"], "application/json");
        uris.push(content["uri"].as_str().unwrap().to_string());
    }

    assert_eq!(uris[0], uris[1]);
    let uri = &uris[0];
    assert!(uri.starts_with("file://tmp/127.0.0.1/post/"), "{}", uri);
    assert!(uri.ends_with(".json"), "{}", uri);

    let file_name = uri.rsplit('/').next().unwrap();
    let stored = dir.path().join("tmp/127.0.0.1/post").join(file_name);
    let stored: Value = serde_json::from_slice(&std::fs::read(stored).unwrap()).unwrap();
    assert_eq!(stored["data"], r#"{"hello":"world"}"#);

    // the GET path does not match and stays inline
    running
        .input
        .send(request("inline-1", "GET", "http://some.domain/get"))
        .await
        .unwrap();
    let output = recv(&mut running.sinks.output).await;
    assert!(json(&output).get("uri").is_none());
}

#[tokio::test]
async fn test_large_response_is_externalized() {
    let backend = start_echo_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        resource_root: dir.path().to_string_lossy().into_owned(),
        ..config_for(backend)
    };
    let (mut running, _shutdown) = start(&config);

    let mut message = request("big-1", "POST", "http://some.domain/post");
    message.payload = vec![b'x'; 1_000_001].into();
    running.input.send(message).await.unwrap();

    let output = recv(&mut running.sinks.output).await;
    let content = json(&output);
    assert!(content["size"].as_u64().unwrap() > 1_000_000);
    assert!(content["uri"].as_str().unwrap().starts_with("file://tmp/127.0.0.1/post/"));

    let analytics = recv(&mut running.sinks.analytics).await;
    assert_eq!(analytics.headers.get_u16("status_code"), Some(200));
}

#[tokio::test]
async fn test_correlation_ids_survive_concurrency() {
    let backend = start_echo_backend().await;
    let (mut running, _shutdown) = start(&config_for(backend));

    let ids: BTreeSet<String> = (0..10).map(|i| format!("id-{}", i)).collect();
    for id in &ids {
        let url = format!("http://some.domain/get?n={}", id);
        running.input.send(request(id, "GET", &url)).await.unwrap();
    }

    let mut seen = BTreeSet::new();
    for _ in 0..ids.len() {
        let output = recv(&mut running.sinks.output).await;
        let id = output.continuation_id().unwrap();
        assert_eq!(json(&output)["args"]["n"], id.as_str());
        seen.insert(id);
    }
    assert_eq!(seen, ids);
}

#[tokio::test]
async fn test_rate_limit_spaces_requests() {
    let backend = start_echo_backend().await;
    let config = GatewayConfig {
        request_per_second: 5.0,
        ..config_for(backend)
    };
    let (mut running, _shutdown) = start(&config);

    let started = Instant::now();
    for i in 0..4 {
        let url = "http://some.domain/status/204";
        running.input.send(request(&i.to_string(), "GET", url)).await.unwrap();
    }
    for _ in 0..4 {
        recv(&mut running.sinks.output).await;
    }

    // one burst token, then three more at 200ms each
    assert!(started.elapsed() >= Duration::from_millis(550), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_shutdown_drains_and_closes_sinks() {
    let backend = start_echo_backend().await;
    let (mut running, shutdown) = start(&config_for(backend));

    running
        .input
        .send(request("last", "GET", "http://some.domain/get"))
        .await
        .unwrap();
    let output = recv(&mut running.sinks.output).await;
    assert_eq!(output.continuation_id().as_deref(), Some("last"));

    shutdown.trigger();
    running.task.await.unwrap();
    assert!(running.sinks.retry_feedback.recv().await.is_none());
}

#[tokio::test]
async fn test_message_without_method_is_rejected() {
    let backend = start_echo_backend().await;
    let (mut running, _shutdown) = start(&config_for(backend));

    let headers: MessageHeaders = [
        ("continuation_id", "bad-1"),
        ("http_requestUrl", "http://some.domain/get"),
    ]
    .into_iter()
    .collect();
    running.input.send(Message::empty(headers)).await.unwrap();

    let output = recv(&mut running.sinks.output).await;
    assert_eq!(output.continuation_id().as_deref(), Some("bad-1"));
    assert!(output.headers.contains("error_message"));
}
