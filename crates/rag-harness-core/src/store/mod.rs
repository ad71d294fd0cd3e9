//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the narrow interface the pipeline needs
//! from a full-text search engine: index management, document CRUD, and a
//! relevance-ranked keyword search over `title` and `content`.
//!
//! Implementations must be `Send + Sync`; a single handle is shared by all
//! concurrent requests, so any connection state must be pooled rather than
//! locked per request.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::models::{ContextDocument, DocumentPatch, NewDocument, SearchHit};

/// Abstract search-engine backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_index`](DocumentStore::ensure_index) | Create the index if absent (idempotent) |
/// | [`index_document`](DocumentStore::index_document) | Store a document, returning its new id |
/// | [`search`](DocumentStore::search) | Keyword search over title and content |
/// | [`get_all`](DocumentStore::get_all) | List documents in the index |
/// | [`title_exists`](DocumentStore::title_exists) | Exact-title lookup across the whole index |
/// | [`get`](DocumentStore::get) | Fetch one document by id |
/// | [`update`](DocumentStore::update) | Partial update of a document |
/// | [`delete`](DocumentStore::delete) | Delete a document |
/// | [`health`](DocumentStore::health) | Backend status check |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the backing collection for `name` if it does not exist.
    ///
    /// Never fails because the index already exists.
    async fn ensure_index(&self, name: &str) -> Result<(), StoreError>;

    /// Ensure the index exists, then store `doc` and return its generated id.
    async fn index_document(&self, name: &str, doc: &NewDocument) -> Result<String, StoreError>;

    /// Match `query` against `title` OR `content`, returning at most `limit`
    /// hits sorted by descending score.
    ///
    /// A missing index or an empty match set yields an empty vector.
    async fn search(&self, name: &str, query: &str, limit: usize)
        -> Result<Vec<SearchHit>, StoreError>;

    /// Return up to `limit` documents from the index.
    async fn get_all(&self, name: &str, limit: usize) -> Result<Vec<ContextDocument>, StoreError>;

    /// Whether any document in the index has exactly this title.
    ///
    /// Not bounded by a listing limit. A missing index yields `false`.
    async fn title_exists(&self, name: &str, title: &str) -> Result<bool, StoreError>;

    /// Fetch a single document, failing with `DocumentNotFound` if absent.
    async fn get(&self, name: &str, id: &str) -> Result<ContextDocument, StoreError>;

    /// Apply `patch` to document `id`. Last write wins.
    async fn update(&self, name: &str, id: &str, patch: &DocumentPatch) -> Result<(), StoreError>;

    async fn delete(&self, name: &str, id: &str) -> Result<(), StoreError>;

    /// Report backend status details. Fails when the backend is unreachable.
    async fn health(&self) -> Result<Value, StoreError> {
        Ok(Value::Null)
    }
}
