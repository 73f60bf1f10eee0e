//! End-to-end tests against a mock chat completion server.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::RETRY_AFTER},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use voice_gateway::caller::{RetryPolicy, UpstreamCaller};
use voice_gateway::models::{CompletionRequest, GenerationParams};
use voice_gateway::rate_limit::RateLimiter;
use voice_gateway::router;
use voice_gateway::state::AppState;
use voice_gateway::upstream::{
    AzureInferenceClient, CompletionClient, OpenAiClient, Provider, build_client,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn params() -> GenerationParams {
    GenerationParams {
        model: "openai/gpt-4.1".to_string(),
        temperature: 1.0,
        top_p: 1.0,
        system_prompt: None,
    }
}

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("Failed to create HTTP client")
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test123",
        "object": "chat.completion",
        "model": "openai/gpt-4.1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn app(server: &MockServer, provider: Provider, policy: RetryPolicy) -> Router {
    let client = build_client(provider, http(), &server.uri(), "test-key", "2024-05-01-preview");
    let state = Arc::new(AppState {
        rate_limiter: Arc::new(RateLimiter::new(20, Duration::from_secs(60))),
        caller: Some(UpstreamCaller::new(client, params(), policy, Duration::from_secs(15))),
    });
    router(state, CorsLayer::new())
}

fn generate(prompt: Value) -> Request<Body> {
    Request::post("/api/generate")
        .header("content-type", "application/json")
        .body(Body::from(prompt.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_generate_round_trip_trims_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-4.1",
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": " Hi there! "}}]})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = app(&mock_server, Provider::Openai, RetryPolicy::default())
        .oneshot(generate(json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"text": "Hi there!"}));
}

#[tokio::test]
async fn test_azure_client_sends_api_key_and_version() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(query_param("api-version", "2024-05-01-preview"))
        .and(header("api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Azure says hi")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = AzureInferenceClient::new(http(), &mock_server.uri(), "test-key", "2024-05-01-preview");
    let request = CompletionRequest {
        prompt: "hi".to_string(),
        params: params(),
    };

    let text = client.complete(&request).await.unwrap();
    assert_eq!(text.as_deref(), Some("Azure says hi"));
    assert_eq!(client.name(), "azure");
}

#[tokio::test]
async fn test_openai_client_reports_upstream_error_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Bad credentials", "code": "unauthorized"}})),
        )
        .mount(&mock_server)
        .await;

    let client = OpenAiClient::new(http(), &mock_server.uri(), "wrong-key");
    let request = CompletionRequest {
        prompt: "hi".to_string(),
        params: params(),
    };

    let failure = client.complete(&request).await.unwrap_err();
    assert_eq!(failure.status, Some(401));
    assert_eq!(failure.message, "Bad credentials");
    assert!(!failure.is_throttle());
}

#[tokio::test]
async fn test_error_without_json_body_gets_generic_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = app(&mock_server, Provider::Openai, RetryPolicy::default())
        .oneshot(generate(json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await, json!({"error": "Upstream error"}));
}

#[tokio::test]
async fn test_throttle_then_success_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_json(json!({"error": {"message": "Too many requests"}})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("second time lucky")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = app(&mock_server, Provider::Azure, RetryPolicy::default())
        .oneshot(generate(json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["text"], "second time lucky");
}

#[tokio::test]
async fn test_persistent_throttle_exhausts_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let response = app(&mock_server, Provider::Openai, RetryPolicy::default())
        .oneshot(generate(json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[RETRY_AFTER], "0");
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("Rate limited upstream"), "{error}");
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too slow"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let client = build_client(Provider::Openai, http(), &mock_server.uri(), "test-key", "unused");
    let caller = UpstreamCaller::new(client, params(), RetryPolicy::default(), Duration::from_millis(300));

    let started = std::time::Instant::now();
    let err = caller.generate("hello").await.unwrap_err();

    assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_missing_choices_yield_placeholder() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let response = app(&mock_server, Provider::Openai, RetryPolicy::default())
        .oneshot(generate(json!({"prompt": "hello"})))
        .await
        .unwrap();

    assert_eq!(body_json(response).await, json!({"text": "No output."}));
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let mock_server = MockServer::start().await;
    let app = app(&mock_server, Provider::Openai, RetryPolicy::default());

    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "healthy");

    // touch a counter so the registry has something to print
    let _ = app
        .clone()
        .oneshot(generate(json!({"prompt": ""})))
        .await
        .unwrap();

    let metrics = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let bytes = to_bytes(metrics.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("voice_gateway_requests_total"), "{text}");
}
