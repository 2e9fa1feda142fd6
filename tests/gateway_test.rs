use httpmock::prelude::*;
use serde_json::json;
use sheet_insight::core::{CompletionGateway, CompletionRequest, OutputShape};
use sheet_insight::utils::error::GatewayError;
use sheet_insight::{GatewaySettings, GroqGateway};

fn gateway_for(server: &MockServer) -> GroqGateway {
    GroqGateway::new(GatewaySettings {
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
        base_url: server.url(""),
        timeout_seconds: 5,
        max_retries: 3,
    })
    .unwrap()
}

fn columns_shape() -> OutputShape {
    OutputShape::new(
        "column_concepts",
        "{ \"columns\": [ { \"index\": integer, \"concept\": string, \"confidence\": number } ] }",
        |value| {
            value
                .get("columns")
                .and_then(|v| v.as_array())
                .map(|_| ())
                .ok_or_else(|| "missing 'columns' array".to_string())
        },
    )
}

fn request() -> CompletionRequest {
    CompletionRequest {
        system_message: "You are interpreting a sheet.".to_string(),
        prompt: "Assign a concept to every column.".to_string(),
        shape: columns_shape(),
    }
}

fn chat_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [ { "message": { "role": "assistant", "content": content } } ]
    })
}

#[tokio::test]
async fn test_conforming_output_passes_through() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(chat_body(
                "{\"columns\": [{\"index\": 0, \"concept\": \"status\", \"confidence\": 0.9}]}",
            ));
    });

    let gateway = gateway_for(&server);
    let output = gateway.complete(request()).await.unwrap();

    mock.assert();
    assert_eq!(output["columns"][0]["concept"], "status");
}

#[tokio::test]
async fn test_malformed_output_repaired_once() {
    let server = MockServer::start();

    // the initial request body is fully deterministic, so an exact
    // match hits it and nothing else
    let first = server.mock(|when, then| {
        when.method(POST).path("/chat/completions").json_body(json!({
            "model": "test-model",
            "messages": [
                { "role": "system", "content": "You are interpreting a sheet." },
                { "role": "user", "content": "Assign a concept to every column." },
            ],
            "temperature": 0.1,
            "max_tokens": 1024,
            "response_format": { "type": "json_object" },
        }));
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(chat_body("{\"wrong_key\": []}"));
    });
    // repair prompts quote the schema reminder back
    let repair = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("Required shape");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(chat_body(
                "{\"columns\": [{\"index\": 0, \"concept\": \"date\", \"confidence\": 0.8}]}",
            ));
    });

    let gateway = gateway_for(&server);
    let output = gateway.complete(request()).await.unwrap();

    assert_eq!(first.hits(), 1);
    assert_eq!(repair.hits(), 1);
    assert_eq!(output["columns"][0]["concept"], "date");
}

#[tokio::test]
async fn test_persistently_malformed_output_surfaces_error() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(chat_body("not json at all"));
    });

    let gateway = gateway_for(&server);
    let error = gateway.complete(request()).await.unwrap_err();

    // original call plus exactly one repair attempt
    assert_eq!(mock.hits(), 2);
    assert!(matches!(error, GatewayError::MalformedOutput { .. }));
}

#[tokio::test]
async fn test_server_errors_retried_to_exhaustion() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(500);
    });

    let gateway = gateway_for(&server);
    let error = gateway.complete(request()).await.unwrap_err();

    assert_eq!(mock.hits(), 3);
    match error {
        GatewayError::Unavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_auth_failure_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401);
    });

    let gateway = gateway_for(&server);
    let error = gateway.complete(request()).await.unwrap_err();

    assert_eq!(mock.hits(), 1);
    assert!(matches!(error, GatewayError::Unavailable { .. }));
}

#[tokio::test]
async fn test_connection_probe() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(chat_body("{\"status\": \"ok\"}"));
    });

    let gateway = gateway_for(&server);
    assert!(gateway.test_connection().await);
}
