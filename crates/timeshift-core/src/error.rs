//! Error types for Timeshift Core.

use crate::config::ConfigError;
use crate::request::Decade;
use thiserror::Error;
use timeshift_abstraction::ModelError;

/// Core error type for styling operations.
#[derive(Error, Debug)]
pub enum StyleError {
    /// The model credential is missing. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Settings could not be loaded or failed validation.
    #[error("Invalid settings: {0}")]
    Settings(#[from] ConfigError),

    /// The encoded input image is malformed. Never retried.
    #[error("Invalid image input: {0}")]
    InvalidInput(String),

    /// The image model failed and retrying did not help (or was not allowed).
    #[error("Image generation failed after {attempts} attempt(s): {source}")]
    Service {
        /// How many calls were made before giving up.
        attempts: u32,
        /// The last error returned by the model.
        source: ModelError,
    },

    /// The model answered but returned no image, usually a policy refusal.
    #[error("The model responded without an image{}", describe_raw_text(raw_text))]
    ContentRejected {
        /// Whatever text the model returned instead (possibly empty).
        raw_text: String,
    },

    /// The content rejection fallback was attempted and also failed.
    #[error("Fallback generation for the {decade} failed: {fallback} (original failure: {original})")]
    FallbackFailed {
        /// The decade the fallback instruction was built for.
        decade: Decade,
        /// Message of the original content rejection.
        original: String,
        /// The error that ended the fallback cycle.
        #[source]
        fallback: Box<StyleError>,
    },
}

fn describe_raw_text(raw_text: &str) -> String {
    let trimmed = raw_text.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl StyleError {
    /// Wraps a model error that escaped the retry loop after `attempts` calls.
    pub(crate) fn from_model_error(error: ModelError, attempts: u32) -> Self {
        match error {
            ModelError::MissingCredential(message) => Self::Configuration(message),
            source => Self::Service { attempts, source },
        }
    }

    /// Whether this error is a content rejection (not a backend fault).
    pub fn is_content_rejection(&self) -> bool {
        matches!(self, Self::ContentRejected { .. })
    }
}

/// Result type alias for styling operations.
pub type Result<T> = std::result::Result<T, StyleError>;
