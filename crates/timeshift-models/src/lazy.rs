//! Deferred model construction.
//!
//! `LazyImageModel` postpones building the real client (and therefore reading
//! its credential) until the first request is made. Construction happens at
//! most once; a failed attempt leaves the cell empty so the next call retries.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use timeshift_abstraction::{GenerationRequest, GenerationResponse, ImageModel, ModelError};
use tracing::{debug, error};

type ModelInit = dyn Fn() -> Result<Arc<dyn ImageModel>, ModelError> + Send + Sync;

/// An `ImageModel` whose inner model is built on first use.
///
/// The cell is a `once_cell::sync::OnceCell`, so concurrent first calls are
/// safe: one initializer runs and the others block until it finishes.
pub struct LazyImageModel {
    model_id: String,
    init: Box<ModelInit>,
    inner: OnceCell<Arc<dyn ImageModel>>,
}

impl LazyImageModel {
    /// Creates a lazy model that calls `init` on first use.
    pub fn new<F>(model_id: impl Into<String>, init: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn ImageModel>, ModelError> + Send + Sync + 'static,
    {
        Self {
            model_id: model_id.into(),
            init: Box::new(init),
            inner: OnceCell::new(),
        }
    }

    /// Whether the inner model has been built yet.
    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    fn resolve(&self) -> Result<&Arc<dyn ImageModel>, ModelError> {
        self.inner.get_or_try_init(|| {
            debug!(model_id = %self.model_id, "Initializing image model on first use");
            (self.init)().inspect_err(|e| {
                error!(model_id = %self.model_id, error = %e, "Image model initialization failed");
            })
        })
    }
}

impl fmt::Debug for LazyImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyImageModel")
            .field("model_id", &self.model_id)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ImageModel for LazyImageModel {
    async fn generate_image(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ModelError> {
        let model = Arc::clone(self.resolve()?);
        model.generate_image(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
