//! Wire-level tests for [`CanvasClient`] against a local mock HTTP server.

use std::time::Duration;

use docsheet_core::{
    CanvasClient, Config, DocumentHandle, ExtractedText, StructuringError, StructuringService,
};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn client_for(server: &MockServer) -> CanvasClient {
    let config = Config {
        api_key: Some("test-key".into()),
        canvas_id: Some("canvas-42".into()),
        base_url: server.uri(),
        records_field: "Itens".into(),
        request_timeout_secs: 1,
        ..Config::default()
    };
    CanvasClient::from_config(&config).unwrap()
}

fn document(text: &str) -> ExtractedText {
    ExtractedText {
        handle: DocumentHandle::new(0, "/batch/a.pdf"),
        text: text.to_string(),
    }
}

fn completion(content: Value) -> Value {
    json!({ "choices": [{ "message": { "content": content } }] })
}

#[tokio::test]
async fn posts_bearer_request_and_decodes_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(json!({
            "canvas_id": "canvas-42",
            "variables": { "arquivo": "Página 1\u{c}Página 2" },
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
            "Itens": [{ "Codigo": "1082" }, { "Codigo": "1099" }]
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let records = client
        .structure(&document("Página 1\u{c}Página 2"))
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].fields.get("Codigo"), Some(&json!("1082")));
    assert_eq!(records[1].fields.get("Codigo"), Some(&json!("1099")));
}

#[tokio::test]
async fn rate_limit_is_a_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .structure(&document("text"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StructuringError::Service {
            status: Some(429),
            ..
        }
    ));
}

#[tokio::test]
async fn non_success_status_keeps_body_snippet() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .structure(&document("text"))
        .await
        .unwrap_err();

    match err {
        StructuringError::Service { status, message } => {
            assert_eq!(status, Some(401));
            assert!(message.contains("invalid credentials"), "{message}");
        }
        other => panic!("expected service error, got {:?}", other),
    }
}

#[tokio::test]
async fn non_json_body_is_a_schema_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .structure(&document("text"))
        .await
        .unwrap_err();

    match err {
        StructuringError::Schema { path, .. } => assert_eq!(path, "$"),
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_records_field_is_a_schema_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion(json!({ "Outro": [] }))),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .structure(&document("text"))
        .await
        .unwrap_err();

    assert!(matches!(err, StructuringError::Schema { .. }));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(json!({ "Itens": [] })))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .structure(&document("text"))
        .await
        .unwrap_err();

    match err {
        StructuringError::Service { status, message } => {
            assert_eq!(status, None);
            assert_eq!(message, "request timed out after 1s");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}
