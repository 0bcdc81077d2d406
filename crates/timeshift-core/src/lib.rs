//! Timeshift core.
//!
//! Restyles a source image according to a text instruction through an
//! external image model, tolerating transient backend faults and content
//! rejections:
//!
//! - [`request`] decodes the `data:` URL input and builds the primary and
//!   decade-based fallback requests.
//! - [`retry`] calls the model with bounded exponential backoff, retrying
//!   only server-side faults.
//! - [`interpret`] turns a successful response into an image or a
//!   content rejection.
//! - [`orchestrator`] ties the three together and runs the fallback cycle
//!   at most once.

pub mod config;
pub mod error;
pub mod interpret;
pub mod logging;
pub mod orchestrator;
pub mod request;
pub mod retry;

pub use config::{Config, ConfigError, LogFormat};
pub use error::{Result, StyleError};
pub use interpret::{GenerationOutcome, interpret};
pub use orchestrator::{
    GenerationRoute, StyleGenerator, StyledImage, generate_styled_image,
    generate_styled_image_with,
};
pub use request::{Decade, decode_image, extract_decade, fallback_instruction};
pub use retry::{FaultClass, ResilientInvoker, RetryPolicy, Sleeper, TokioSleeper, classify_fault};
