//! Image model abstraction layer for Timeshift.
//!
//! This module defines the capability boundary between the styling core and
//! whatever generative backend produces images: the request and response
//! shapes, the structured error type, and the `ImageModel` trait.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when interacting with an image model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred while sending the request (e.g., network issues).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The backend answered with an error status.
    #[error("Service Fault{}: {message}", format_fault_tag(*status, code.as_deref()))]
    ServiceFault {
        /// HTTP status code, when the fault came from an HTTP response.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        /// Backend fault code (e.g., "INTERNAL", "UNAVAILABLE").
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Human-readable message from the backend.
        message: String,
    },

    /// The model returned an error (e.g., invalid input).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The credential needed to reach the backend is not available.
    #[error("Missing Credential: {0}")]
    MissingCredential(String),

    /// The model provider is not supported, or rejected our credentials.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// Provider quota exceeded or rate limit hit (hard stop error).
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g., "gemini").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

fn format_fault_tag(status: Option<u16>, code: Option<&str>) -> String {
    match (status, code) {
        (Some(status), Some(code)) => format!(" ({status} {code})"),
        (Some(status), None) => format!(" ({status})"),
        (None, Some(code)) => format!(" ({code})"),
        (None, None) => String::new(),
    }
}

impl ModelError {
    /// Returns the human-readable message carried by this error, without the
    /// variant prefix used by `Display`.
    pub fn message(&self) -> &str {
        match self {
            Self::RequestError(message)
            | Self::ModelResponseError(message)
            | Self::SerializationError(message)
            | Self::MissingCredential(message)
            | Self::UnsupportedModelProvider(message)
            | Self::Other(message)
            | Self::ServiceFault { message, .. } => message,
            Self::QuotaExceeded { message, .. } => message.as_deref().unwrap_or_default(),
        }
    }
}

/// An encoded image: a media type plus the base64 text of its bytes.
///
/// Payloads are immutable once built. The base64 text is carried as-is; it is
/// only decoded on request via [`ImagePayload::decode_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    mime_type: String,
    data: String,
}

impl ImagePayload {
    /// Creates a payload from a media type and already-encoded base64 text.
    #[must_use]
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Creates a payload by base64-encoding raw image bytes.
    #[must_use]
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        Self {
            mime_type: mime_type.into(),
            data: engine.encode(bytes),
        }
    }

    /// The media type, e.g. `image/png`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 text of the image bytes.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Decodes the base64 text back into raw bytes.
    ///
    /// # Errors
    /// Returns `ModelError::SerializationError` if the payload is not valid base64.
    pub fn decode_bytes(&self) -> Result<Vec<u8>, ModelError> {
        let engine = base64::engine::general_purpose::STANDARD;
        engine.decode(self.data.as_bytes()).map_err(|e| {
            ModelError::SerializationError(format!("Invalid base64 image payload: {}", e))
        })
    }

    /// Formats the payload as a self-describing `data:` URL.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Output modalities a request may ask the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    /// Image output.
    Image,
    /// Text output.
    Text,
}

/// A single image-editing request: one source image paired with one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The source image.
    pub image: ImagePayload,
    /// The text instruction describing the edit.
    pub instruction: String,
    /// Requested output modalities.
    pub response_modalities: Vec<ResponseModality>,
}

impl GenerationRequest {
    /// Creates a request that asks for image output only.
    #[must_use]
    pub fn new(image: ImagePayload, instruction: impl Into<String>) -> Self {
        Self {
            image,
            instruction: instruction.into(),
            response_modalities: vec![ResponseModality::Image],
        }
    }
}

/// One content part of a model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsePart {
    /// Text carried by this part, if any.
    pub text: Option<String>,
    /// Inline binary data carried by this part, if any.
    pub inline_data: Option<ImagePayload>,
}

impl ResponsePart {
    /// A text-only part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    /// An inline-image part.
    #[must_use]
    pub fn image(payload: ImagePayload) -> Self {
        Self {
            text: None,
            inline_data: Some(payload),
        }
    }
}

/// The response from a successful image model call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Content parts in the order the model returned them.
    pub parts: Vec<ResponsePart>,

    /// Optional: Plain text returned alongside (or instead of) the parts.
    pub text: Option<String>,

    /// Optional: Why the model stopped (e.g., "STOP", "IMAGE_SAFETY").
    pub finish_reason: Option<String>,

    /// Optional: The ID of the model used to generate the response.
    pub model_id: Option<String>,
}

/// A trait for image models that edit a source image according to a text instruction.
///
/// All models must be `Send + Sync` to allow concurrent use across threads.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Sends one request to the model.
    ///
    /// # Errors
    /// Returns a `ModelError` if the call fails. A call that succeeds but
    /// carries no image is *not* an error at this layer.
    async fn generate_image(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}
