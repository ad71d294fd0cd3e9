//! Language-model backend abstraction.
//!
//! A [`Generator`] exposes single-shot and streaming completion. The model
//! is an explicit per-call argument; implementations hold no "current
//! model" state, so one shared handle serves concurrent requests for
//! different models.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::error::GenerationError;

/// Lazily produced completion fragments, in emission order.
///
/// An `Err` item is always the last item of the stream. Dropping the
/// stream must release the underlying backend connection.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Run a blocking completion and return the full text.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, GenerationError>;

    /// Open a streaming completion.
    ///
    /// Fails up front if the session cannot be opened; failures after the
    /// first fragment arrive in-band as a final `Err` item.
    async fn generate_stream(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<FragmentStream, GenerationError>;

    /// Report backend status details. Fails when the backend is unreachable.
    async fn health(&self) -> Result<Value, GenerationError> {
        Ok(Value::Null)
    }
}
