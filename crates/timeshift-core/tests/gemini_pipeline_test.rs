//! Full pipeline tests: settings, model factory, Gemini HTTP client and the
//! styling core, against a local mock server.

use mockito::{Matcher, Server};
use std::collections::HashMap;
use std::io::Write;
use timeshift_core::{
    Config, Decade, GenerationRoute, StyleError, StyleGenerator, generate_styled_image_with,
};

const MODEL_PATH: &str = "/models/test-model:generateContent";
const INPUT: &str = "data:image/png;base64,iVBORw0KGgo=";

fn config_for(base_url: &str) -> Config {
    let mut config = Config::default();
    config.model.model_id = "test-model".to_string();
    config.model.api_key = Some("test-key".to_string());
    config.model.base_url = Some(base_url.to_string());
    config.retry.initial_delay_ms = 1;
    config
}

fn image_body(data: &str) -> String {
    format!(
        r#"{{"candidates":[{{"content":{{"parts":[{{"inlineData":{{"mimeType":"image/png","data":"{data}"}}}}]}},"finishReason":"STOP"}}]}}"#
    )
}

const REFUSAL_BODY: &str =
    r#"{"candidates":[{"content":{"parts":[{"text":"I can't help with that."}]},"finishReason":"STOP"}]}"#;

#[tokio::test]
async fn test_pipeline_primary_success() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(image_body("UFJJTUFSWQ=="))
        .expect(1)
        .create_async()
        .await;

    let generator = StyleGenerator::from_config(&config_for(&server.url())).unwrap();
    let result = generator.generate(INPUT, "Make it a 1950s diner photo").await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.data_url, "data:image/png;base64,UFJJTUFSWQ==");
    assert_eq!(result.route, GenerationRoute::Primary);
}

#[tokio::test]
async fn test_pipeline_falls_back_after_refusal() {
    let mut server = Server::new_async().await;
    let primary = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .match_body(Matcher::Regex("a sixties look".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(REFUSAL_BODY)
        .expect(1)
        .create_async()
        .await;
    let fallback = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .match_body(Matcher::Regex("living in the 1960s".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(image_body("RkFMTEJBQ0s="))
        .expect(1)
        .create_async()
        .await;

    let generator = StyleGenerator::from_config(&config_for(&server.url())).unwrap();
    let result = generator.generate(INPUT, "Give this person a sixties look").await.unwrap();

    primary.assert_async().await;
    fallback.assert_async().await;
    assert_eq!(result.data_url, "data:image/png;base64,RkFMTEJBQ0s=");
    assert_eq!(result.route, GenerationRoute::Fallback(Decade::Sixties));
}

#[tokio::test]
async fn test_pipeline_retries_internal_errors_then_gives_up() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"error":{"code":500,"message":"An internal error has occurred.","status":"INTERNAL"}}"#,
        )
        .expect(3)
        .create_async()
        .await;

    let generator = StyleGenerator::from_config(&config_for(&server.url())).unwrap();
    let err = generator.generate_styled_image(INPUT, "1970s please").await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, StyleError::Service { attempts: 3, .. }));
    assert!(err.to_string().contains("An internal error has occurred."));
}

#[tokio::test]
async fn test_pipeline_bad_request_is_terminal() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":{"code":400,"message":"Invalid image","status":"INVALID_ARGUMENT"}}"#)
        .expect(1)
        .create_async()
        .await;

    let generator = StyleGenerator::from_config(&config_for(&server.url())).unwrap();
    let err = generator.generate_styled_image(INPUT, "1970s please").await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, StyleError::Service { attempts: 1, .. }));
}

#[tokio::test]
async fn test_pipeline_client_error_mentioning_500_is_terminal() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(
            r#"{"error":{"code":400,"message":"Image exceeds 1500 pixels","status":"INVALID_ARGUMENT"}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let generator = StyleGenerator::from_config(&config_for(&server.url())).unwrap();
    let err = generator.generate_styled_image(INPUT, "1970s please").await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, StyleError::Service { attempts: 1, .. }), "{err}");
}

#[tokio::test]
async fn test_pipeline_unreachable_host_is_terminal_and_hides_key() {
    // Nothing listens on port 5000 here; every attempt fails at connect time.
    let mut config = config_for("http://127.0.0.1:5000");
    config.model.api_key = Some("key-INTERNAL-500".to_string());

    let generator = StyleGenerator::from_config(&config).unwrap();
    let err = generator.generate_styled_image(INPUT, "1970s please").await.unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, StyleError::Service { attempts: 1, .. }), "{message}");
    assert!(!message.contains("key-INTERNAL-500"), "{message}");
}

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> =
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    move |key| map.get(key).cloned()
}

#[tokio::test]
async fn test_settings_file_drives_one_shot_generation() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", MODEL_PATH)
        .match_header("x-goog-api-key", "file-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(image_body("RlJPTUZJTEU="))
        .expect(1)
        .create_async()
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[model]\nmodel_id = \"test-model\"\napi_key = \"file-key\"\nbase_url = \"{}\"",
        server.url()
    )
    .unwrap();
    let path = file.path().to_string_lossy().to_string();

    let url = generate_styled_image_with(
        lookup_from(&[("TIMESHIFT_CONFIG", path.as_str())]),
        INPUT,
        "Make it a 1980s mall portrait",
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert_eq!(url, "data:image/png;base64,RlJPTUZJTEU=");
}

#[tokio::test]
async fn test_one_shot_generation_with_scripted_model() {
    let lookup = lookup_from(&[("TIMESHIFT_MODEL_TYPE", "scripted")]);
    let err = generate_styled_image_with(lookup, INPUT, "Paint it in watercolor")
        .await
        .unwrap_err();
    match err {
        StyleError::ContentRejected { raw_text } => {
            assert_eq!(raw_text, "No scripted outcome remaining");
        }
        other => panic!("unexpected error: {other}"),
    }

    let lookup = lookup_from(&[
        ("TIMESHIFT_MODEL_TYPE", "scripted"),
        ("TIMESHIFT_INITIAL_DELAY_MS", "1"),
    ]);
    let err = generate_styled_image_with(lookup, INPUT, "a 1980s mall portrait")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StyleError::FallbackFailed {
            decade: Decade::Eighties,
            ..
        }
    ));
}

#[tokio::test]
async fn test_one_shot_generation_rejects_bad_settings_before_calling() {
    let lookup = lookup_from(&[("TIMESHIFT_MAX_ATTEMPTS", "0")]);
    let err = generate_styled_image_with(lookup, INPUT, "1970s please")
        .await
        .unwrap_err();
    assert!(matches!(err, StyleError::Settings(_)), "{err}");

    let lookup = lookup_from(&[("TIMESHIFT_MODEL_TYPE", "scripted")]);
    let err = generate_styled_image_with(lookup, "not a data url", "1970s please")
        .await
        .unwrap_err();
    assert!(matches!(err, StyleError::InvalidInput(_)), "{err}");
}
