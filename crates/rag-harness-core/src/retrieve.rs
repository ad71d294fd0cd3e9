//! Context retrieval: search the corpus and keep the top-K hits.

use std::sync::Arc;

use tracing::debug;

use crate::error::StoreError;
use crate::models::SearchHit;
use crate::store::DocumentStore;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Index (corpus namespace) to search.
    pub index: String,
    /// Number of hits requested from the store per search.
    pub search_size: usize,
    /// Number of hits kept as generation context.
    pub top_k: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            index: "context".to_string(),
            search_size: 10,
            top_k: 3,
        }
    }
}

/// Selects the highest-ranked documents for a query.
#[derive(Clone)]
pub struct ContextRetriever {
    store: Arc<dyn DocumentStore>,
    params: RetrievalParams,
}

impl ContextRetriever {
    pub fn new(store: Arc<dyn DocumentStore>, params: RetrievalParams) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Full ranked hit list for `query`, as returned by the store.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let limit = self.params.search_size.max(self.params.top_k);
        self.store.search(&self.params.index, query, limit).await
    }

    /// The first `top_k` hits for `query`, highest score first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let mut hits = self.search(query).await?;
        hits.truncate(self.params.top_k);
        debug!(index = %self.params.index, hits = hits.len(), "retrieved context");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewDocument;
    use crate::store::memory::InMemoryStore;

    async fn retriever(top_k: usize, docs: &[(&str, &str)]) -> ContextRetriever {
        let store = InMemoryStore::new();
        for (title, content) in docs {
            store
                .index_document("context", &NewDocument::new(*title, *content))
                .await
                .unwrap();
        }
        ContextRetriever::new(
            Arc::new(store),
            RetrievalParams {
                top_k,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_truncates_to_top_k_prefix() {
        let r = retriever(
            2,
            &[
                ("one", "rust"),
                ("two", "rust rust"),
                ("three", "rust rust rust"),
                ("four", "rust rust rust rust"),
            ],
        )
        .await;

        let full = r.search("rust").await.unwrap();
        let top = r.retrieve("rust").await.unwrap();
        assert_eq!(full.len(), 4);
        assert_eq!(top.len(), 2);
        assert_eq!(&full[..2], &top[..]);
        assert!(top[0].score >= top[1].score);
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let r = retriever(3, &[]).await;
        assert!(r.retrieve("anything").await.unwrap().is_empty());
    }
}
