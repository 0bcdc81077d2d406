//! Request building: input decoding, decade recovery and the fallback prompt.

use crate::error::{Result, StyleError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use timeshift_abstraction::{GenerationRequest, ImagePayload};

// Compile-time constant pattern, so expect is safe here.
static DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([^;,]+);base64,(.*)$").expect("valid data URL pattern")
});

/// The eras a fallback prompt can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decade {
    /// The 1950s.
    Fifties,
    /// The 1960s.
    Sixties,
    /// The 1970s.
    Seventies,
    /// The 1980s.
    Eighties,
    /// The 1990s.
    Nineties,
    /// The 2000s.
    TwoThousands,
}

impl Decade {
    /// All supported decades, oldest first.
    pub const ALL: [Self; 6] = [
        Self::Fifties,
        Self::Sixties,
        Self::Seventies,
        Self::Eighties,
        Self::Nineties,
        Self::TwoThousands,
    ];

    /// The canonical label, e.g. `"1970s"`.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Fifties => "1950s",
            Self::Sixties => "1960s",
            Self::Seventies => "1970s",
            Self::Eighties => "1980s",
            Self::Nineties => "1990s",
            Self::TwoThousands => "2000s",
        }
    }
}

impl fmt::Display for Decade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Era markers in priority order. Markers are lowercase; the first entry
/// found in the lowercased instruction wins.
const DECADE_MARKERS: [(&str, Decade); 12] = [
    ("1950s", Decade::Fifties),
    ("1960s", Decade::Sixties),
    ("1970s", Decade::Seventies),
    ("1980s", Decade::Eighties),
    ("1990s", Decade::Nineties),
    ("2000s", Decade::TwoThousands),
    ("fifties", Decade::Fifties),
    ("sixties", Decade::Sixties),
    ("seventies", Decade::Seventies),
    ("eighties", Decade::Eighties),
    ("nineties", Decade::Nineties),
    ("y2k", Decade::TwoThousands),
];

/// Decodes a `data:<mediaType>;base64,<payload>` string into an [`ImagePayload`].
///
/// Only the structure is checked; the payload is carried through untouched.
///
/// # Errors
/// Returns `StyleError::InvalidInput` when the prefix or the `;base64,`
/// separator is missing.
pub fn decode_image(encoded: &str) -> Result<ImagePayload> {
    if !encoded.starts_with("data:") {
        return Err(StyleError::InvalidInput(
            "expected a data URL starting with 'data:'".to_string(),
        ));
    }

    let captures = DATA_URL.captures(encoded).ok_or_else(|| {
        StyleError::InvalidInput(
            "expected 'data:<media type>;base64,<payload>' with a ';base64,' separator"
                .to_string(),
        )
    })?;

    Ok(ImagePayload::new(&captures[1], &captures[2]))
}

/// Finds the decade an instruction refers to, if any.
pub fn extract_decade(instruction: &str) -> Option<Decade> {
    let haystack = instruction.to_lowercase();
    DECADE_MARKERS
        .iter()
        .find(|(marker, _)| haystack.contains(marker))
        .map(|&(_, decade)| decade)
}

/// The fixed fallback instruction for a decade.
///
/// Deliberately generic: it names only the era, never anything from the
/// user's own prompt.
pub fn fallback_instruction(decade: Decade) -> String {
    format!(
        "Create a photograph of the person in this image as if they were living in the {decade}. \
         The photograph should capture the distinct fashion, hairstyles, and overall atmosphere \
         of that time period. Ensure the final image is a clear photograph that looks authentic \
         to the era."
    )
}

/// The first-cycle request: the caller's image and instruction as given.
pub fn build_primary_request(image: ImagePayload, instruction: &str) -> GenerationRequest {
    GenerationRequest::new(image, instruction)
}

/// The fallback-cycle request: the same image with the decade template.
pub fn build_fallback_request(image: ImagePayload, decade: Decade) -> GenerationRequest {
    GenerationRequest::new(image, fallback_instruction(decade))
}
