//! Model factory for creating image model instances from configuration.
//!
//! Credentials are never read here. A Gemini model without an explicit API key
//! is wrapped in a [`LazyImageModel`] so the environment lookup happens on the
//! first request instead of at construction time.

use crate::{GeminiImageModel, LazyImageModel, ScriptedImageModel};
use std::str::FromStr;
use std::sync::Arc;
use timeshift_abstraction::{ImageModel, ModelError};
use tracing::{debug, error};

/// Model type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Scripted model for tests and dry runs.
    Scripted,
    /// Google Gemini image model.
    Gemini,
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scripted" | "mock" | "dryrun" => Ok(Self::Scripted),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(()),
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The type of model to create.
    pub model_type: ModelType,
    /// The model ID (e.g., "gemini-2.5-flash-image-preview").
    pub model_id: String,
    /// Optional API key (if not provided, will be loaded from environment on first use).
    pub api_key: Option<String>,
    /// Optional base URL override.
    pub base_url: Option<String>,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    #[must_use]
    pub fn new(model_type: ModelType, model_id: String) -> Self {
        Self {
            model_type,
            model_id,
            api_key: None,
            base_url: None,
        }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    ///
    /// This never fails for a missing credential; that error is deferred to
    /// the first `generate_image` call.
    pub fn create(config: ModelConfig) -> Arc<dyn ImageModel> {
        debug!(
            model_type = ?config.model_type,
            model_id = %config.model_id,
            "Creating image model instance"
        );

        match config.model_type {
            ModelType::Scripted => Arc::new(ScriptedImageModel::new(config.model_id)),
            ModelType::Gemini => {
                let ModelConfig { model_id, api_key, base_url, .. } = config;
                if let Some(api_key) = api_key {
                    let mut model = GeminiImageModel::with_api_key(model_id, api_key);
                    if let Some(base_url) = base_url {
                        model = model.with_base_url(base_url);
                    }
                    return Arc::new(model);
                }

                let id = model_id.clone();
                Arc::new(LazyImageModel::new(model_id, move || {
                    let mut model = GeminiImageModel::new(id.clone())?;
                    if let Some(base_url) = &base_url {
                        model = model.with_base_url(base_url.clone());
                    }
                    Ok(Arc::new(model) as Arc<dyn ImageModel>)
                }))
            }
        }
    }

    /// Creates a model instance from a model type string and model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the model type is unrecognized.
    pub fn create_from_str(
        model_type_str: &str,
        model_id: String,
    ) -> Result<Arc<dyn ImageModel>, ModelError> {
        let model_type = ModelType::from_str(model_type_str).map_err(|()| {
            error!(model_type = %model_type_str, "Unrecognized model type");
            ModelError::UnsupportedModelProvider(format!(
                "Unrecognized model type: {}",
                model_type_str
            ))
        })?;

        Ok(Self::create(ModelConfig::new(model_type, model_id)))
    }
}
