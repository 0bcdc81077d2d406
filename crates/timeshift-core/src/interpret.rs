//! Response interpretation.

use timeshift_abstraction::{GenerationResponse, ImagePayload};
use tracing::{debug, warn};

/// What a successful model call actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The model returned an image.
    Image(ImagePayload),
    /// The model answered without an image (a content rejection).
    NoImageProduced {
        /// Any text the model returned instead; possibly empty.
        raw_text: String,
    },
}

impl GenerationOutcome {
    /// The image as a `data:` URL, if one was produced.
    pub fn data_url(&self) -> Option<String> {
        match self {
            Self::Image(payload) => Some(payload.to_data_url()),
            Self::NoImageProduced { .. } => None,
        }
    }
}

/// Picks the first inline image out of a response.
///
/// A response without one is a content rejection; whatever text came back is
/// kept (and logged) for diagnosis.
pub fn interpret(response: &GenerationResponse) -> GenerationOutcome {
    if let Some(payload) = response.parts.iter().find_map(|part| part.inline_data.as_ref()) {
        debug!(mime_type = %payload.mime_type(), "Model returned an image");
        return GenerationOutcome::Image(payload.clone());
    }

    let raw_text = response.text.clone().unwrap_or_else(|| {
        response.parts.iter().filter_map(|part| part.text.as_deref()).collect::<String>()
    });

    warn!(
        model_id = ?response.model_id,
        finish_reason = ?response.finish_reason,
        raw_text = %raw_text,
        "Model responded without an image"
    );

    GenerationOutcome::NoImageProduced { raw_text }
}
