//! Error taxonomy for the store, generation, and pipeline layers.
//!
//! Adapters return [`StoreError`] or [`GenerationError`] and never swallow
//! failures. The orchestrator wraps them in [`PipelineError`] to record the
//! stage that failed; context administration wraps store errors in
//! [`AdminError`] to record the operation. The agent reports
//! [`AgentError`]. Mapping to transport status codes
//! happens at the HTTP boundary, never here.

use std::fmt;

use thiserror::Error;

/// Failures raised by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The search engine could not be reached.
    #[error("search backend unavailable: {0}")]
    Unavailable(String),
    /// The search engine rejected a write.
    #[error("search backend rejected write: {0}")]
    Write(String),
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    /// The search engine rejected a read or returned a malformed response.
    #[error("search backend error: {0}")]
    Backend(String),
}

/// Failures raised by a [`Generator`](crate::generation::Generator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The model backend could not be reached.
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    /// The model backend returned an error or a malformed response.
    #[error("model backend error: {0}")]
    Backend(String),
}

/// Invalid input to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("query must not be empty")]
    EmptyQuery,
}

/// Pipeline stage at which a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Generate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The adapter error underneath a [`PipelineError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineCause {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// A failed pipeline run, tagged with the stage that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} stage failed: {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub cause: PipelineCause,
}

impl PipelineError {
    pub fn retrieve(err: StoreError) -> Self {
        Self {
            stage: Stage::Retrieve,
            cause: err.into(),
        }
    }

    pub fn generate(err: GenerationError) -> Self {
        Self {
            stage: Stage::Generate,
            cause: err.into(),
        }
    }
}

/// A failed context administration call, tagged with the operation name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {source}")]
pub struct AdminError {
    pub operation: &'static str,
    pub source: StoreError,
}

impl AdminError {
    pub(crate) fn tag(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self { operation, source }
    }
}

/// A failed agent run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("search tool failed: {0}")]
    Tool(#[source] StoreError),
    #[error("agent model call failed: {0}")]
    Model(#[source] GenerationError),
    /// The model kept calling tools without giving an answer.
    #[error("agent gave no final answer after {0} steps")]
    StepLimit(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = PipelineError::generate(GenerationError::Unavailable("connection refused".into()));
        assert_eq!(err.stage, Stage::Generate);
        assert_eq!(
            err.to_string(),
            "generate stage failed: model backend unavailable: connection refused"
        );
    }

    #[test]
    fn test_admin_error_names_operation() {
        let err = AdminError::tag("delete")(StoreError::DocumentNotFound("abc".into()));
        assert_eq!(err.to_string(), "delete failed: document not found: abc");
    }

    #[test]
    fn test_agent_error_messages() {
        let err = AgentError::Tool(StoreError::Unavailable("down".into()));
        assert_eq!(err.to_string(), "search tool failed: search backend unavailable: down");
        assert_eq!(
            AgentError::StepLimit(6).to_string(),
            "agent gave no final answer after 6 steps"
        );
    }
}
