//! The RAG orchestrator.
//!
//! Each request runs `retrieve → compose → generate` with no state carried
//! between requests:
//!
//! 1. Retrieve the top-K hits for the query.
//! 2. With no hits, send the query verbatim; otherwise send the prompt
//!    built by [`compose`].
//! 3. Generate, either in one call ([`RagOrchestrator::run`]) or as a
//!    stream of [`StreamEvent`]s ([`RagOrchestrator::run_stream`]).
//!
//! The context branch is decided once, before generation starts. Adapter
//! failures are wrapped in [`PipelineError`] with the failing stage; no
//! retries are attempted.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{info, warn};

use crate::error::{GenerationError, PipelineError, StoreError};
use crate::generation::{FragmentStream, Generator};
use crate::models::{GenerationRequest, GenerationResult, SearchHit, StreamEvent};
use crate::prompt::compose;
use crate::retrieve::ContextRetriever;

/// Stream of pipeline events, always terminated by `End` or `Error`.
pub type EventStream = BoxStream<'static, StreamEvent>;

#[derive(Clone)]
pub struct RagOrchestrator {
    retriever: ContextRetriever,
    generator: Arc<dyn Generator>,
}

impl RagOrchestrator {
    pub fn new(retriever: ContextRetriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    /// Retrieve context and compose the prompt for `query`.
    async fn prepare(&self, query: &str) -> Result<(String, Vec<SearchHit>), PipelineError> {
        let hits = self
            .retriever
            .retrieve(query)
            .await
            .map_err(PipelineError::retrieve)?;
        Ok((compose(query, &hits), hits))
    }

    /// Run the pipeline to completion.
    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationResult, PipelineError> {
        let (prompt, hits) = self.prepare(&request.query).await.inspect_err(log_failure)?;
        info!(model = %request.model, context_docs = hits.len(), "running rag generation");

        let generated_text = self
            .generator
            .generate(&prompt, &request.model)
            .await
            .map_err(PipelineError::generate)
            .inspect_err(log_failure)?;

        Ok(GenerationResult {
            generated_text,
            context_used: hits,
        })
    }

    /// Run the pipeline, forwarding fragments as the model produces them.
    ///
    /// Failures at any point are reported as a single terminal
    /// [`StreamEvent::Error`]. Dropping the returned stream drops the
    /// upstream model stream.
    pub fn run_stream(&self, request: GenerationRequest) -> EventStream {
        let this = self.clone();
        let opened = async move {
            let (prompt, hits) = this.prepare(&request.query).await?;
            info!(model = %request.model, context_docs = hits.len(), "streaming rag generation");
            this.generator
                .generate_stream(&prompt, &request.model)
                .await
                .map_err(PipelineError::generate)
        };
        open_events(opened)
    }

    /// Full ranked search results for `query`, without top-K truncation.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        self.retriever.search(query).await
    }

    /// Direct model invocation with no retrieval.
    pub async fn generate(&self, prompt: &str, model: &str) -> Result<String, GenerationError> {
        self.generator.generate(prompt, model).await
    }

    /// Direct streaming model invocation with no retrieval.
    pub fn generate_stream(&self, prompt: String, model: String) -> EventStream {
        let generator = self.generator.clone();
        let opened = async move {
            generator
                .generate_stream(&prompt, &model)
                .await
                .map_err(PipelineError::generate)
        };
        open_events(opened)
    }
}

fn log_failure(err: &PipelineError) {
    warn!(stage = %err.stage, error = %err, "rag pipeline failed");
}

/// Turn a pending stream-open into an event stream.
fn open_events<F>(opened: F) -> EventStream
where
    F: std::future::Future<Output = Result<FragmentStream, PipelineError>> + Send + 'static,
{
    stream::once(opened)
        .flat_map(|result| match result {
            Ok(fragments) => into_events(fragments),
            Err(err) => {
                log_failure(&err);
                stream::iter([StreamEvent::Error {
                    message: err.to_string(),
                }])
                .boxed()
            }
        })
        .boxed()
}

/// Map model fragments to events, stopping after the first error.
fn into_events(fragments: FragmentStream) -> EventStream {
    stream::unfold(Some(fragments), |state| async move {
        let mut fragments = state?;
        match fragments.next().await {
            Some(Ok(text)) => Some((StreamEvent::Chunk { text }, Some(fragments))),
            Some(Err(err)) => {
                let err = PipelineError::generate(err);
                log_failure(&err);
                Some((
                    StreamEvent::Error {
                        message: err.to_string(),
                    },
                    None,
                ))
            }
            None => Some((StreamEvent::End, None)),
        }
    })
    .boxed()
}
