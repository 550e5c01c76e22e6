use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use meter_reader::config::VisionConfig;
use meter_reader::error::MeterError;
use meter_reader::pipeline::ReadingStatus;
use meter_reader::vision::{Classifier, GeminiClient, OpenAiVisionClient, VisionProvider};

mod common;
use common::{init_test_logger, png_bytes, test_pipeline, write_png};

fn vision_config(model: &str, server: &MockServer) -> VisionConfig {
    VisionConfig {
        model: model.to_string(),
        api_key: Some("test-key".to_string()),
        base_url: Some(format!("{}/", server.uri())),
        timeout_secs: 10,
        max_retries: 1,
        prompt: None,
    }
}

fn gemini_reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}], "role": "model"},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn gemini_sends_key_prompt_and_inline_image() {
    init_test_logger();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{"parts": [
                {"text": "read the meter"},
                {"inline_data": {"mime_type": "image/png"}}
            ]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("00482")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&vision_config("gemini/gemini-2.5-flash", &server)).unwrap();
    let text = client.classify("read the meter", &png_bytes()).await.unwrap();
    assert_eq!(text, "00482");
}

#[tokio::test]
async fn gemini_reading_is_trimmed_by_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("  48213\n")))
        .mount(&server)
        .await;

    let provider =
        VisionProvider::new(&vision_config("gemini/gemini-2.5-flash", &server)).unwrap();
    assert!(provider.is_available());
    let pipeline = test_pipeline(Arc::new(provider), 10);

    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), "meter.png");
    let result = pipeline.extract(&image).await;

    assert_eq!(result.reading.as_deref(), Some("48213"));
    assert_eq!(result.status, ReadingStatus::Ok);
}

#[tokio::test]
async fn gemini_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("123456")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&vision_config("gemini/gemini-2.5-flash", &server)).unwrap();
    let text = client.classify("prompt", &png_bytes()).await.unwrap();
    assert_eq!(text, "123456");
}

#[tokio::test]
async fn gemini_exhausted_rate_limit_reports_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
        .expect(2)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&vision_config("gemini/gemini-2.5-flash", &server)).unwrap();
    let err = client.classify("prompt", &png_bytes()).await.unwrap_err();
    assert!(matches!(
        err,
        MeterError::VisionRateLimit {
            retry_after: Some(17)
        }
    ));
}

#[tokio::test]
async fn gemini_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad image"))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::new(&vision_config("gemini/gemini-2.5-flash", &server)).unwrap();
    let err = client.classify("prompt", &png_bytes()).await.unwrap_err();
    match err {
        MeterError::Vision(msg) => assert!(msg.contains("bad image"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn gemini_empty_candidates_become_unreadable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let provider =
        VisionProvider::new(&vision_config("gemini/gemini-2.5-flash", &server)).unwrap();
    let pipeline = test_pipeline(Arc::new(provider), 10);
    let dir = TempDir::new().unwrap();
    let image = write_png(dir.path(), "meter.png");

    let result = pipeline.extract(&image).await;
    assert_eq!(result.reading.as_deref(), Some("Unreadable"));
    assert_eq!(result.status, ReadingStatus::Failed);
}

#[tokio::test]
async fn openai_sends_bearer_and_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 64})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "7700123"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiVisionClient::new(&vision_config("openai/gpt-4o-mini", &server)).unwrap();
    let text = client.classify("read the meter", &png_bytes()).await.unwrap();
    assert_eq!(text, "7700123");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let url = body["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn unavailable_provider_never_reaches_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("1")))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = vision_config("gemini/gemini-2.5-flash", &server);
    config.api_key = None;
    let provider = VisionProvider::new(&config).unwrap();

    let err = provider.classify("prompt", &png_bytes()).await.unwrap_err();
    assert!(matches!(err, MeterError::VisionUnavailable(_)));
}
