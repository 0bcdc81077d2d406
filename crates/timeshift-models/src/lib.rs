//! Image model implementations for Timeshift.
//!
//! This crate provides concrete implementations of the `ImageModel` trait.
//!
//! # Supported Providers
//!
//! - **Scripted**: Replays a fixed sequence of outcomes (testing and dry runs)
//! - **Gemini**: Google's Gemini image models (API key required)

pub mod factory;
pub mod gemini;
pub mod lazy;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use timeshift_abstraction::{
    GenerationRequest, GenerationResponse, ImageModel, ImagePayload, ModelError, ResponsePart,
};
use tracing::debug;

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use gemini::GeminiImageModel;
pub use lazy::LazyImageModel;

/// An `ImageModel` that replays a scripted sequence of outcomes.
///
/// Every request is recorded so callers can inspect what was sent. Once the
/// script runs dry the model answers with a text-only response, which the
/// styling core treats as a content rejection.
#[derive(Debug, Default)]
pub struct ScriptedImageModel {
    id: String,
    script: Mutex<VecDeque<Result<GenerationResponse, ModelError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedImageModel {
    /// Creates a `ScriptedImageModel` with an empty script.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Creates a `ScriptedImageModel` that replays `outcomes` in order.
    #[must_use]
    pub fn with_outcomes(
        id: impl Into<String>,
        outcomes: impl IntoIterator<Item = Result<GenerationResponse, ModelError>>,
    ) -> Self {
        let model = Self::new(id);
        model.lock_script().extend(outcomes);
        model
    }

    /// Appends an outcome to the end of the script.
    pub fn push(&self, outcome: Result<GenerationResponse, ModelError>) {
        self.lock_script().push_back(outcome);
    }

    /// Appends a response carrying a single inline image.
    pub fn push_image(&self, payload: ImagePayload) {
        self.push(Ok(GenerationResponse {
            parts: vec![ResponsePart::image(payload)],
            model_id: Some(self.id.clone()),
            ..GenerationResponse::default()
        }));
    }

    /// Appends a successful response that carries only text.
    pub fn push_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.push(Ok(GenerationResponse {
            parts: vec![ResponsePart::text(text.clone())],
            text: Some(text),
            model_id: Some(self.id.clone()),
            ..GenerationResponse::default()
        }));
    }

    /// Appends a failed call.
    pub fn push_error(&self, error: ModelError) {
        self.push(Err(error));
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock_script().len()
    }

    fn lock_script(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<GenerationResponse, ModelError>>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ImageModel for ScriptedImageModel {
    async fn generate_image(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ModelError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());

        let next = self.lock_script().pop_front();
        debug!(
            model_id = %self.id,
            instruction_len = request.instruction.len(),
            scripted = next.is_some(),
            "ScriptedImageModel answering request"
        );

        next.unwrap_or_else(|| {
            Ok(GenerationResponse {
                text: Some("No scripted outcome remaining".to_string()),
                model_id: Some(self.id.clone()),
                ..GenerationResponse::default()
            })
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}
