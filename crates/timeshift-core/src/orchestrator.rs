//! Styled image generation with the decade fallback.
//!
//! A request runs at most two cycles. The primary cycle sends the caller's
//! instruction. If the model answers without an image and the instruction
//! names a decade, one fallback cycle sends the generic decade template.
//! Service faults end the operation in whichever cycle they occur.

use crate::config::Config;
use crate::error::{Result, StyleError};
use crate::interpret::{GenerationOutcome, interpret};
use crate::request::{
    Decade, build_fallback_request, build_primary_request, decode_image, extract_decade,
};
use crate::retry::{ResilientInvoker, RetryPolicy, Sleeper, TokioSleeper};
use std::fmt;
use std::sync::Arc;
use timeshift_abstraction::{GenerationRequest, ImageModel, ImagePayload};
use timeshift_models::ModelFactory;
use tracing::{info, warn};

/// Which cycle produced the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationRoute {
    /// The caller's own instruction worked.
    Primary,
    /// The primary cycle was rejected; the decade template worked.
    Fallback(Decade),
}

/// A generated image and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledImage {
    /// `data:<mime>;base64,<payload>` of the generated image.
    pub data_url: String,
    /// Cycle that produced it.
    pub route: GenerationRoute,
}

/// Restyles images through an [`ImageModel`].
pub struct StyleGenerator {
    model: Arc<dyn ImageModel>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for StyleGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleGenerator")
            .field("model_id", &self.model.model_id())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl StyleGenerator {
    /// Creates a generator with the default retry policy and real sleeping.
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self {
            model,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the backoff sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Builds a generator from loaded settings.
    ///
    /// No credential is read here; a missing key surfaces on the first call.
    ///
    /// # Errors
    /// Returns `StyleError::Settings` if the settings are invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let model = ModelFactory::create(config.model_config()?);
        Ok(Self::new(model).with_policy(config.retry_policy()))
    }

    /// The retry policy applied to each cycle.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Restyles `encoded` according to `instruction`.
    ///
    /// # Errors
    /// - `InvalidInput` if `encoded` is not a base64 `data:` URL (no call is made).
    /// - `Configuration` if the model credential is missing.
    /// - `Service` if a fault was terminal or retries ran out.
    /// - `ContentRejected` if no image came back and the instruction names no decade.
    /// - `FallbackFailed` if the decade fallback also failed.
    pub async fn generate(&self, encoded: &str, instruction: &str) -> Result<StyledImage> {
        let image = decode_image(encoded)?;

        let raw_text =
            match self.run_cycle(build_primary_request(image.clone(), instruction)).await? {
                GenerationOutcome::Image(payload) => {
                    return Ok(styled(&payload, GenerationRoute::Primary));
                }
                GenerationOutcome::NoImageProduced { raw_text } => raw_text,
            };
        let rejection = StyleError::ContentRejected { raw_text };

        let Some(decade) = extract_decade(instruction) else {
            warn!("Content rejected and no decade in the instruction; not falling back");
            return Err(rejection);
        };

        info!(%decade, "Content rejected; retrying with the fallback instruction");
        match self.run_cycle(build_fallback_request(image, decade)).await {
            Ok(GenerationOutcome::Image(payload)) => {
                Ok(styled(&payload, GenerationRoute::Fallback(decade)))
            }
            Ok(GenerationOutcome::NoImageProduced { raw_text }) => Err(fallback_failed(
                decade,
                &rejection,
                StyleError::ContentRejected { raw_text },
            )),
            Err(fallback) => Err(fallback_failed(decade, &rejection, fallback)),
        }
    }

    /// Restyles `encoded` and returns only the resulting data URL.
    ///
    /// # Errors
    /// Same as [`StyleGenerator::generate`].
    pub async fn generate_styled_image(&self, encoded: &str, instruction: &str) -> Result<String> {
        self.generate(encoded, instruction).await.map(|image| image.data_url)
    }

    async fn run_cycle(&self, request: GenerationRequest) -> Result<GenerationOutcome> {
        let invoker =
            ResilientInvoker::new(self.model.as_ref(), self.policy, self.sleeper.as_ref());
        let response = invoker.invoke(&request).await?;
        Ok(interpret(&response))
    }
}

fn styled(payload: &ImagePayload, route: GenerationRoute) -> StyledImage {
    StyledImage {
        data_url: payload.to_data_url(),
        route,
    }
}

fn fallback_failed(decade: Decade, rejection: &StyleError, fallback: StyleError) -> StyleError {
    warn!(%decade, error = %fallback, "Fallback generation failed");
    StyleError::FallbackFailed {
        decade,
        original: rejection.to_string(),
        fallback: Box::new(fallback),
    }
}

/// Restyles an image using settings from the environment.
///
/// Settings and the model are built per call, so nothing (including the
/// credential) is checked until an operation actually runs.
///
/// # Errors
/// `Settings` if configuration cannot be loaded; otherwise as
/// [`StyleGenerator::generate`].
pub async fn generate_styled_image(encoded: &str, instruction: &str) -> Result<String> {
    generate_styled_image_with(|key| std::env::var(key).ok(), encoded, instruction).await
}

/// Like [`generate_styled_image`], reading settings through `lookup`
/// instead of the process environment.
///
/// # Errors
/// Same as [`generate_styled_image`].
pub async fn generate_styled_image_with<F>(
    lookup: F,
    encoded: &str,
    instruction: &str,
) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let config = Config::load_with(lookup)?;
    StyleGenerator::from_config(&config)?
        .generate_styled_image(encoded, instruction)
        .await
}
