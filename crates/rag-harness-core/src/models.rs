//! Core data models that flow through the RAG pipeline.
//!
//! Documents are the unit of ingestion, hits the unit of retrieval, and
//! [`StreamEvent`] the unit of streamed generation output.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// A document stored in a corpus index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDocument {
    /// Identifier assigned by the store.
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Document body submitted for indexing, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
}

impl NewDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Partial update: only the fields that are `Some` change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    /// Apply the patch to a stored document in place.
    pub fn apply_to(&self, doc: &mut NewDocument) {
        if let Some(title) = &self.title {
            doc.title = title.clone();
        }
        if let Some(content) = &self.content {
            doc.content = content.clone();
        }
    }
}

/// A single ranked search result. Higher `score` means more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub content: String,
    pub score: f64,
}

/// A validated request for the RAG pipeline.
///
/// The query is guaranteed non-empty and the model is always resolved,
/// either from the caller or from the process-wide default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub query: String,
    pub model: String,
}

impl GenerationRequest {
    pub fn new(
        query: impl Into<String>,
        model: Option<String>,
        default_model: &str,
    ) -> Result<Self, RequestError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());
        Ok(Self { query, model })
    }
}

/// Result of a non-streaming RAG run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generated_text: String,
    /// Hits used as context, highest score first. Empty when retrieval
    /// found nothing and the query was sent to the model verbatim.
    pub context_used: Vec<SearchHit>,
}

/// One element of a streamed generation.
///
/// Every stream ends with exactly one terminal element: [`StreamEvent::End`]
/// on success or [`StreamEvent::Error`] on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEvent {
    Chunk { text: String },
    Error { message: String },
    End,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Error { .. } => "error",
            StreamEvent::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_model() {
        let req = GenerationRequest::new("What is AI?", None, "llama2").unwrap();
        assert_eq!(req.model, "llama2");

        let req = GenerationRequest::new("What is AI?", Some("mistral".into()), "llama2").unwrap();
        assert_eq!(req.model, "mistral");

        let req = GenerationRequest::new("What is AI?", Some("  ".into()), "llama2").unwrap();
        assert_eq!(req.model, "llama2");
    }

    #[test]
    fn test_request_rejects_blank_query() {
        assert_eq!(
            GenerationRequest::new("   ", None, "llama2"),
            Err(RequestError::EmptyQuery)
        );
    }

    #[test]
    fn test_patch_only_touches_supplied_fields() {
        let mut doc = NewDocument::new("Title", "Body");
        DocumentPatch {
            title: None,
            content: Some("X".into()),
        }
        .apply_to(&mut doc);
        assert_eq!(doc.title, "Title");
        assert_eq!(doc.content, "X");
    }

    #[test]
    fn test_stream_event_wire_shape() {
        let chunk = serde_json::to_value(StreamEvent::Chunk { text: "hi".into() }).unwrap();
        assert_eq!(chunk, serde_json::json!({ "kind": "chunk", "text": "hi" }));

        let end = serde_json::to_value(StreamEvent::End).unwrap();
        assert_eq!(end, serde_json::json!({ "kind": "end" }));

        let err = StreamEvent::Error {
            message: "boom".into(),
        };
        assert!(err.is_terminal());
        assert_eq!(err.kind(), "error");
    }
}
