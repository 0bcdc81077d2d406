//! Google Gemini image model implementation.
//!
//! This module provides an implementation of the `ImageModel` trait for the
//! Gemini `generateContent` endpoint with image output enabled.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use timeshift_abstraction::{
    GenerationRequest, GenerationResponse, ImageModel, ImagePayload, ModelError, ResponseModality,
    ResponsePart,
};
use tracing::{debug, error, warn};

/// Default Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default image-capable Gemini model.
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash-image-preview";

/// Header carrying the API key. The key is never put in the URL, so it
/// cannot leak through transport error messages.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Google Gemini image model implementation.
#[derive(Debug, Clone)]
pub struct GeminiImageModel {
    /// The model ID (e.g., "gemini-2.5-flash-image-preview").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl GeminiImageModel {
    /// Creates a new `GeminiImageModel`, reading the API key from the environment.
    ///
    /// # Errors
    /// Returns `ModelError::MissingCredential` if none of `GEMINI_API_KEY` or
    /// `GOOGLE_API_KEY` holds a non-empty value.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = API_KEY_ENV_VARS
            .iter()
            .find_map(|name| env::var(name).ok().filter(|value| !value.trim().is_empty()))
            .ok_or_else(|| {
                ModelError::MissingCredential(format!(
                    "{} environment variable not set",
                    API_KEY_ENV_VARS.join(" or ")
                ))
            })?;

        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `GeminiImageModel` with a custom API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self {
            model_id,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Points the model at a different endpoint (proxies, test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request_body(request: &GenerationRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type: request.image.mime_type().to_string(),
                            data: request.image.data().to_string(),
                        },
                    },
                    GeminiPart::Text {
                        text: request.instruction.clone(),
                    },
                ],
            }],
            generation_config: GeminiGenerationConfig {
                response_modalities: request.response_modalities.clone(),
            },
        }
    }

    fn convert_response(&self, response: GeminiResponse) -> GenerationResponse {
        let block_reason = response.prompt_feedback.and_then(|feedback| feedback.block_reason);

        let Some(candidate) = response.candidates.into_iter().next() else {
            warn!(
                model_id = %self.model_id,
                block_reason = ?block_reason,
                "Gemini API returned no candidates"
            );
            return GenerationResponse {
                finish_reason: block_reason,
                model_id: Some(self.model_id.clone()),
                ..GenerationResponse::default()
            };
        };

        let parts: Vec<ResponsePart> = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .map(|part| ResponsePart {
                text: part.text,
                inline_data: part
                    .inline_data
                    .map(|inline| ImagePayload::new(inline.mime_type, inline.data)),
            })
            .collect();

        let text: Vec<&str> = parts.iter().filter_map(|part| part.text.as_deref()).collect();
        let text = if text.is_empty() {
            None
        } else {
            Some(text.concat())
        };

        GenerationResponse {
            parts,
            text,
            finish_reason: candidate.finish_reason.or(block_reason),
            model_id: Some(self.model_id.clone()),
        }
    }
}

#[async_trait]
impl ImageModel for GeminiImageModel {
    async fn generate_image(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            mime_type = %request.image.mime_type(),
            instruction_len = request.instruction.len(),
            "GeminiImageModel generating image"
        );

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model_id);
        let request_body = Self::build_request_body(request);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!(error = %e, "Failed to send request to Gemini API");
                ModelError::RequestError(format!("Network error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                status = %status,
                error = %error_text,
                "Gemini API returned error status"
            );
            return Err(map_http_error(status, &error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            let e = e.without_url();
            error!(error = %e, "Failed to parse Gemini API response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        Ok(self.convert_response(gemini_response))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Maps a non-success HTTP status and body to a structured `ModelError`.
///
/// Every status other than auth and quota failures becomes a `ServiceFault`
/// carrying the status code and the `error.status` field of the Gemini error
/// envelope, so callers classify on those fields and never on message text.
fn map_http_error(status: StatusCode, error_text: &str) -> ModelError {
    let envelope = serde_json::from_str::<GeminiErrorEnvelope>(error_text).ok();
    let message = envelope
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| error_text.to_string());
    let code = envelope.and_then(|e| e.error.status);

    match status.as_u16() {
        401 | 403 => ModelError::UnsupportedModelProvider(format!(
            "Authentication failed ({}): {}",
            status, message
        )),
        402 | 429 => ModelError::QuotaExceeded {
            provider: "gemini".to_string(),
            message: Some(message),
        },
        code_value => ModelError::ServiceFault {
            status: Some(code_value),
            code,
            message,
        },
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    InlineData { inline_data: GeminiInlineData },
    Text { text: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mime_type", alias = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<ResponseModality>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: Option<String>,
    status: Option<String>,
}
