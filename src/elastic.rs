//! Elasticsearch-backed [`DocumentStore`].
//!
//! Talks to the Elasticsearch REST API over a single pooled
//! [`reqwest::Client`] shared by all requests.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | ensure index | `HEAD /{index}`, then `PUT /{index}` if missing |
//! | index | `POST /{index}/_doc` |
//! | search | `POST /{index}/_search` with `multi_match` on `title`, `content` |
//! | list | `POST /{index}/_search` with `match_all` |
//! | title lookup | `POST /{index}/_count` with a `term` on `title.keyword` |
//! | get | `GET /{index}/_doc/{id}` |
//! | update | `POST /{index}/_update/{id}` with a partial `doc` |
//! | delete | `DELETE /{index}/_doc/{id}` |
//! | health | `GET /_cluster/health` |
//!
//! # Error mapping
//!
//! - Connection failures and timeouts → [`StoreError::Unavailable`]
//! - `404` on get/update/delete → [`StoreError::DocumentNotFound`]
//! - Other non-success on writes → [`StoreError::Write`]
//! - Other non-success or unparseable bodies on reads → [`StoreError::Backend`]
//!
//! Index names and ids are pushed as single path segments, so `/`, `?`,
//! `#` and `%` inside them are percent-encoded. An id of `""`, `.` or `..`
//! never names a document and is rejected as [`StoreError::DocumentNotFound`]
//! without a request.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use rag_harness_core::error::StoreError;
use rag_harness_core::models::{ContextDocument, DocumentPatch, NewDocument, SearchHit};
use rag_harness_core::store::DocumentStore;

use crate::config::SearchConfig;

pub struct ElasticStore {
    base_url: Url,
    client: Client,
    refresh_on_write: bool,
}

impl ElasticStore {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .with_context(|| format!("Invalid search.url: {}", config.url))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid search.url: {} cannot hold a path", config.url);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(url = %config.url, "elasticsearch client initialized");
        Ok(Self {
            base_url,
            client,
            refresh_on_write: config.refresh_on_write,
        })
    }

    /// Base URL with each segment appended verbatim as one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Backend(format!("{} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn index_url(&self, name: &str, rest: &[&str]) -> Result<Url, StoreError> {
        if !is_plain_segment(name) {
            return Err(StoreError::Backend(format!("invalid index name {:?}", name)));
        }
        let mut segments = vec![name];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    fn doc_url(&self, name: &str, endpoint: &str, id: &str) -> Result<Url, StoreError> {
        if !is_plain_segment(id) {
            return Err(StoreError::DocumentNotFound(id.to_string()));
        }
        self.index_url(name, &[endpoint, id])
    }

    fn refresh_param(&self) -> &'static str {
        if self.refresh_on_write {
            "wait_for"
        } else {
            "false"
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: RawSource,
}

#[derive(Deserialize, Default)]
struct RawSource {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: RawSource,
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

/// Dot segments are dropped by URL normalization rather than encoded.
fn is_plain_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
}

fn unavailable(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

async fn error_body(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{}: {}", status, body)
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    response
        .json::<T>()
        .await
        .map_err(|e| StoreError::Backend(format!("invalid response body: {}", e)))
}

/// Request body for a relevance-ranked keyword match over both fields.
pub fn multi_match_query(query: &str, size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "multi_match": {
                "query": query,
                "fields": ["title", "content"]
            }
        }
    })
}

/// Request body counting documents whose title equals `title` exactly.
pub fn title_term_query(title: &str) -> Value {
    json!({ "query": { "term": { "title.keyword": title } } })
}

fn into_hits(response: SearchResponse) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = response
        .hits
        .hits
        .into_iter()
        .map(|h| SearchHit {
            id: h.id,
            title: h.source.title,
            content: h.source.content,
            score: h.score.unwrap_or(0.0),
        })
        .collect();
    // The engine already ranks; a stable sort only guards against reordering.
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

#[async_trait]
impl DocumentStore for ElasticStore {
    async fn ensure_index(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .head(self.index_url(name, &[])?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(StoreError::Backend(error_body(response).await));
        }

        let response = self
            .client
            .put(self.index_url(name, &[])?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status().is_success() {
            info!(index = name, "index created");
            return Ok(());
        }
        let body = error_body(response).await;
        // Lost a creation race with another request.
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(StoreError::Write(body))
    }

    async fn index_document(&self, name: &str, doc: &NewDocument) -> Result<String, StoreError> {
        self.ensure_index(name).await?;
        let response = self
            .client
            .post(self.index_url(name, &["_doc"])?)
            .query(&[("refresh", self.refresh_param())])
            .json(doc)
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(StoreError::Write(error_body(response).await));
        }
        let indexed: IndexResponse = parse_json(response).await?;
        info!(index = name, id = %indexed.id, "document indexed");
        Ok(indexed.id)
    }

    async fn search(
        &self,
        name: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let response = self
            .client
            .post(self.index_url(name, &["_search"])?)
            .json(&multi_match_query(query, limit))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            warn!(index = name, "index not found, returning no hits");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(error_body(response).await));
        }
        let mut hits = into_hits(parse_json(response).await?);
        hits.truncate(limit);
        info!(index = name, hits = hits.len(), "search completed");
        Ok(hits)
    }

    async fn get_all(&self, name: &str, limit: usize) -> Result<Vec<ContextDocument>, StoreError> {
        let response = self
            .client
            .post(self.index_url(name, &["_search"])?)
            .json(&json!({ "size": limit, "query": { "match_all": {} } }))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(error_body(response).await));
        }
        let parsed: SearchResponse = parse_json(response).await?;
        let docs: Vec<ContextDocument> = parsed
            .hits
            .hits
            .into_iter()
            .map(|h| ContextDocument {
                id: h.id,
                title: h.source.title,
                content: h.source.content,
            })
            .collect();
        debug!(index = name, count = docs.len(), "listed documents");
        Ok(docs)
    }

    async fn title_exists(&self, name: &str, title: &str) -> Result<bool, StoreError> {
        let response = self
            .client
            .post(self.index_url(name, &["_count"])?)
            .json(&title_term_query(title))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(error_body(response).await));
        }
        let counted: CountResponse = parse_json(response).await?;
        Ok(counted.count > 0)
    }

    async fn get(&self, name: &str, id: &str) -> Result<ContextDocument, StoreError> {
        let response = self
            .client
            .get(self.doc_url(name, "_doc", id)?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::DocumentNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StoreError::Backend(error_body(response).await));
        }
        let parsed: GetResponse = parse_json(response).await?;
        if !parsed.found {
            return Err(StoreError::DocumentNotFound(id.to_string()));
        }
        Ok(ContextDocument {
            id: parsed.id,
            title: parsed.source.title,
            content: parsed.source.content,
        })
    }

    async fn update(&self, name: &str, id: &str, patch: &DocumentPatch) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.doc_url(name, "_update", id)?)
            .query(&[("refresh", self.refresh_param())])
            .json(&json!({ "doc": patch }))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::DocumentNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StoreError::Write(error_body(response).await));
        }
        info!(index = name, id, "document updated");
        Ok(())
    }

    async fn delete(&self, name: &str, id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.doc_url(name, "_doc", id)?)
            .query(&[("refresh", self.refresh_param())])
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::DocumentNotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(StoreError::Write(error_body(response).await));
        }
        info!(index = name, id, "document deleted");
        Ok(())
    }

    async fn health(&self) -> Result<Value, StoreError> {
        let response = self
            .client
            .get(self.url(&["_cluster", "health"])?)
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(StoreError::Backend(error_body(response).await));
        }
        let health: Value = parse_json(response).await?;
        Ok(json!({
            "cluster_name": health["cluster_name"],
            "status": health["status"],
            "number_of_nodes": health["number_of_nodes"],
            "active_primary_shards": health["active_primary_shards"],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_match_body() {
        let body = multi_match_query("What is AI?", 10);
        assert_eq!(body["size"], 10);
        assert_eq!(body["query"]["multi_match"]["query"], "What is AI?");
        assert_eq!(
            body["query"]["multi_match"]["fields"],
            json!(["title", "content"])
        );
    }

    #[test]
    fn test_parse_search_response() {
        let raw = json!({
            "took": 3,
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "max_score": 1.9,
                "hits": [
                    { "_index": "context", "_id": "a", "_score": 1.9,
                      "_source": { "title": "Introduction to AI", "content": "AI is..." } },
                    { "_index": "context", "_id": "b", "_score": 0.4,
                      "_source": { "title": "Machine Learning Basics" } }
                ]
            }
        });
        let parsed: SearchResponse = serde_json::from_value(raw).unwrap();
        let hits = into_hits(parsed);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].title, "Introduction to AI");
        assert_eq!(hits[1].content, "");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_patch_serializes_only_supplied_fields() {
        let patch = DocumentPatch {
            title: None,
            content: Some("X".into()),
        };
        assert_eq!(json!({ "doc": patch }), json!({ "doc": { "content": "X" } }));
    }

    fn store(url: &str) -> ElasticStore {
        ElasticStore::new(&SearchConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_ids_are_single_path_segments() {
        let store = store("http://localhost:9200");
        let url = store.doc_url("context", "_doc", "../../context").unwrap();
        assert_eq!(url.path(), "/context/_doc/..%2F..%2Fcontext");
        let url = store.doc_url("context", "_update", "a?b#c").unwrap();
        assert_eq!(url.path(), "/context/_update/a%3Fb%23c");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_dot_ids_rejected() {
        let store = store("http://localhost:9200");
        for id in ["", ".", ".."] {
            assert_eq!(
                store.doc_url("context", "_doc", id),
                Err(StoreError::DocumentNotFound(id.to_string()))
            );
        }
        assert!(matches!(
            store.index_url("..", &["_search"]),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn test_base_path_preserved() {
        let store = store("http://localhost:9200/es/");
        assert_eq!(
            store.index_url("context", &["_search"]).unwrap().as_str(),
            "http://localhost:9200/es/context/_search"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = ElasticStore::new(&SearchConfig {
            url: "not a url".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("Invalid search.url"));
    }

    #[test]
    fn test_title_term_query() {
        assert_eq!(
            title_term_query("Computer Vision"),
            json!({ "query": { "term": { "title.keyword": "Computer Vision" } } })
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let store = ElasticStore::new(&SearchConfig {
            url: format!("http://127.0.0.1:{}", port),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        let err = store.search("context", "anything", 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = store
            .index_document("context", &NewDocument::new("t", "c"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
