//! In-memory [`DocumentStore`] implementation for tests and offline runs.
//!
//! Indices are kept in a `HashMap` behind `std::sync::RwLock`. Keyword
//! search scores `title` and `content` independently with BM25 and sums
//! the field scores, so a term found in both fields outranks a term found
//! in only one.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::StoreError;
use crate::models::{ContextDocument, DocumentPatch, NewDocument, SearchHit};

use super::DocumentStore;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

#[derive(Default)]
struct Index {
    /// Insertion order is preserved for listing and score ties.
    docs: Vec<(String, NewDocument)>,
}

impl Index {
    fn position(&self, id: &str) -> Option<usize> {
        self.docs.iter().position(|(doc_id, _)| doc_id == id)
    }
}

/// In-memory store with namespaced indices.
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, Index>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Index>>, StoreError> {
        self.indices
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Index>>, StoreError> {
        self.indices
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase alphanumeric terms.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Per-field BM25 statistics over one index.
struct FieldStats {
    tokens: Vec<Vec<String>>,
    avg_len: f64,
    doc_freq: HashMap<String, usize>,
}

impl FieldStats {
    fn build<'a>(texts: impl Iterator<Item = &'a str>) -> Self {
        let tokens: Vec<Vec<String>> = texts.map(tokenize).collect();
        let total: usize = tokens.iter().map(Vec::len).sum();
        let avg_len = if tokens.is_empty() {
            0.0
        } else {
            total as f64 / tokens.len() as f64
        };
        let mut doc_freq = HashMap::new();
        for field in &tokens {
            let unique: HashSet<&String> = field.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        Self {
            tokens,
            avg_len,
            doc_freq,
        }
    }

    fn score(&self, doc: usize, terms: &[String]) -> f64 {
        let field = &self.tokens[doc];
        if field.is_empty() || self.avg_len <= 0.0 {
            return 0.0;
        }
        let n = self.tokens.len() as f64;
        let len_norm = 1.0 - BM25_B + BM25_B * field.len() as f64 / self.avg_len;
        terms
            .iter()
            .map(|term| {
                let tf = field.iter().filter(|t| *t == term).count() as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm)
            })
            .sum()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ensure_index(&self, name: &str) -> Result<(), StoreError> {
        self.write()?.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn index_document(&self, name: &str, doc: &NewDocument) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.write()?
            .entry(name.to_string())
            .or_default()
            .docs
            .push((id.clone(), doc.clone()));
        Ok(id)
    }

    async fn search(
        &self,
        name: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let indices = self.read()?;
        let index = match indices.get(name) {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };

        let titles = FieldStats::build(index.docs.iter().map(|(_, d)| d.title.as_str()));
        let contents = FieldStats::build(index.docs.iter().map(|(_, d)| d.content.as_str()));

        let mut hits: Vec<SearchHit> = index
            .docs
            .iter()
            .enumerate()
            .filter_map(|(i, (id, doc))| {
                let score = titles.score(i, &terms) + contents.score(i, &terms);
                (score > 0.0).then(|| SearchHit {
                    id: id.clone(),
                    title: doc.title.clone(),
                    content: doc.content.clone(),
                    score,
                })
            })
            .collect();

        // Stable sort keeps insertion order for equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_all(&self, name: &str, limit: usize) -> Result<Vec<ContextDocument>, StoreError> {
        let indices = self.read()?;
        let index = match indices.get(name) {
            Some(index) => index,
            None => return Ok(Vec::new()),
        };
        Ok(index
            .docs
            .iter()
            .take(limit)
            .map(|(id, doc)| ContextDocument {
                id: id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
            })
            .collect())
    }

    async fn title_exists(&self, name: &str, title: &str) -> Result<bool, StoreError> {
        let indices = self.read()?;
        Ok(indices
            .get(name)
            .is_some_and(|index| index.docs.iter().any(|(_, doc)| doc.title == title)))
    }

    async fn get(&self, name: &str, id: &str) -> Result<ContextDocument, StoreError> {
        let indices = self.read()?;
        indices
            .get(name)
            .and_then(|index| index.docs.iter().find(|(doc_id, _)| doc_id == id))
            .map(|(id, doc)| ContextDocument {
                id: id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
            })
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    async fn update(&self, name: &str, id: &str, patch: &DocumentPatch) -> Result<(), StoreError> {
        let mut indices = self.write()?;
        let index = indices
            .get_mut(name)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;
        let pos = index
            .position(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;
        patch.apply_to(&mut index.docs[pos].1);
        Ok(())
    }

    async fn delete(&self, name: &str, id: &str) -> Result<(), StoreError> {
        let mut indices = self.write()?;
        let index = indices
            .get_mut(name)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;
        let pos = index
            .position(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;
        index.docs.remove(pos);
        Ok(())
    }

    async fn health(&self) -> Result<Value, StoreError> {
        let indices = self.read()?;
        let counts: serde_json::Map<String, Value> = indices
            .iter()
            .map(|(name, index)| (name.clone(), json!(index.docs.len())))
            .collect();
        Ok(json!({ "backend": "memory", "indices": counts }))
    }
}
