//! HTTP-level tests for `GeminiImageModel` against a local mock server.
//!
//! These exercise the real request/response path (serialization, status
//! mapping, response decoding) without network access.

use mockito::{Matcher, Server};
use timeshift_abstraction::{GenerationRequest, ImageModel, ImagePayload, ModelError};
use timeshift_models::GeminiImageModel;

const MODEL_PATH: &str = "/models/test-model:generateContent";

fn test_model(base_url: &str) -> GeminiImageModel {
    GeminiImageModel::with_api_key("test-model".to_string(), "test-key".to_string())
        .with_base_url(base_url)
}

fn test_request() -> GenerationRequest {
    GenerationRequest::new(
        ImagePayload::new("image/png", "iVBORw0KGgo="),
        "Reimagine the person in this photo in the style of the 1980s.",
    )
}

#[tokio::test]
async fn test_generate_image_returns_inline_image() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_header("x-goog-api-key", "test-key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"inline_data": {"mime_type": "image/png", "data": "iVBORw0KGgo="}},
                    {"text": "Reimagine the person in this photo in the style of the 1980s."}
                ]
            }],
            "generationConfig": {"responseModalities": ["IMAGE"]}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"inlineData":{"mimeType":"image/png","data":"R0VORVJBVEVE"}}]},"finishReason":"STOP"}]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let model = test_model(&server.url());
    let response = model.generate_image(&test_request()).await.unwrap();

    mock.assert_async().await;
    assert_eq!(
        response.parts[0].inline_data,
        Some(ImagePayload::new("image/png", "R0VORVJBVEVE"))
    );
    assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
}

#[tokio::test]
async fn test_generate_image_text_only_response_is_not_an_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"candidates":[{"content":{"parts":[{"text":"I can't help with that request."}]},"finishReason":"STOP"}]}"#,
        )
        .create_async()
        .await;

    let response = test_model(&server.url()).generate_image(&test_request()).await.unwrap();

    assert!(response.parts.iter().all(|part| part.inline_data.is_none()));
    assert_eq!(response.text.as_deref(), Some("I can't help with that request."));
}

#[tokio::test]
async fn test_generate_image_maps_internal_error_to_service_fault() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"error":{"code":500,"message":"An internal error has occurred.","status":"INTERNAL"}}"#,
        )
        .create_async()
        .await;

    let error = test_model(&server.url()).generate_image(&test_request()).await.unwrap_err();

    assert_eq!(
        error,
        ModelError::ServiceFault {
            status: Some(500),
            code: Some("INTERNAL".to_string()),
            message: "An internal error has occurred.".to_string(),
        }
    );
}

#[tokio::test]
async fn test_generate_image_maps_bad_request() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":{"code":400,"message":"Invalid image","status":"INVALID_ARGUMENT"}}"#)
        .create_async()
        .await;

    let error = test_model(&server.url()).generate_image(&test_request()).await.unwrap_err();

    assert_eq!(
        error,
        ModelError::ServiceFault {
            status: Some(400),
            code: Some("INVALID_ARGUMENT".to_string()),
            message: "Invalid image".to_string(),
        }
    );
}

#[tokio::test]
async fn test_generate_image_transport_error_omits_url_and_key() {
    // Nothing listens on port 5000 here; the request fails at connect time.
    let model = GeminiImageModel::with_api_key(
        "test-model".to_string(),
        "key-INTERNAL-500".to_string(),
    )
    .with_base_url("http://127.0.0.1:5000");

    let error = model.generate_image(&test_request()).await.unwrap_err();

    let text = error.to_string();
    assert!(matches!(error, ModelError::RequestError(_)), "{text}");
    assert!(!text.contains("key-INTERNAL-500"), "{text}");
    assert!(!text.contains("127.0.0.1:5000"), "{text}");
}

#[tokio::test]
async fn test_generate_image_rejects_malformed_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let error = test_model(&server.url()).generate_image(&test_request()).await.unwrap_err();

    assert!(matches!(error, ModelError::SerializationError(_)));
}

#[tokio::test]
#[ignore = "Requires GEMINI_API_KEY and network access"]
async fn test_live_generate_image() {
    let model = GeminiImageModel::new(timeshift_models::gemini::DEFAULT_MODEL_ID.to_string())
        .expect("GEMINI_API_KEY environment variable must be set for live tests");
    // 1x1 transparent PNG
    let image = ImagePayload::new(
        "image/png",
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=",
    );
    let request = GenerationRequest::new(image, "Turn this into a 1960s postcard.");
    let response = model.generate_image(&request).await.expect("live call should succeed");
    assert!(response.model_id.is_some());
}
