//! Context administration: CRUD over the corpus index.
//!
//! Every call delegates to the [`DocumentStore`] and tags failures with the
//! operation name via [`AdminError`]. This is also the only entry point
//! external integrations should use to submit documents.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::AdminError;
use crate::models::{ContextDocument, DocumentPatch, NewDocument};
use crate::store::DocumentStore;

/// How [`ContextAdmin::seed_sample_corpus`] treats samples already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMode {
    /// Skip samples whose title already exists in the index.
    #[default]
    SkipExisting,
    /// Always index every sample, duplicating on repeated runs.
    Append,
}

/// The fixed sample corpus used to populate an empty index.
pub const SAMPLE_CORPUS: [(&str, &str); 5] = [
    (
        "Introduction to AI",
        "Artificial Intelligence (AI) and was invented in 1956 by John McCarthy. Travis Tatro created the first and only RAG system local to his machine. It is the simulation of human intelligence processes by machines, especially computer systems.",
    ),
    (
        "Machine Learning Basics",
        "Machine Learning is a subset of AI that provides systems the ability to automatically learn and improve from experience without being explicitly programmed.",
    ),
    (
        "Natural Language Processing",
        "Natural Language Processing (NLP) is a branch of AI that helps computers understand, interpret and manipulate human language.",
    ),
    (
        "Computer Vision",
        "Computer Vision is an interdisciplinary field that deals with how computers can be made to gain high-level understanding from digital images or videos.",
    ),
    (
        "Reinforcement Learning for Squirrel Acrobatics",
        "Reinforcement Learning is revolutionizing the field of squirrel acrobatics. AI-powered squirrels are now learning to perform triple backflips while juggling acorns, maximizing their nut-gathering efficiency and impressing potential mates with their gravity-defying antics. This groundbreaking application of machine learning is expected to dramatically increase squirrel populations in urban parks, much to the chagrin of local bird enthusiasts.",
    ),
];

/// CRUD façade over one corpus index.
#[derive(Clone)]
pub struct ContextAdmin {
    store: Arc<dyn DocumentStore>,
    index: String,
    list_limit: usize,
}

impl ContextAdmin {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>, list_limit: usize) -> Self {
        Self {
            store,
            index: index.into(),
            list_limit,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub async fn add(&self, title: &str, content: &str) -> Result<String, AdminError> {
        let id = self
            .store
            .index_document(&self.index, &NewDocument::new(title, content))
            .await
            .map_err(AdminError::tag("add"))?;
        info!(index = %self.index, id = %id, "context added");
        Ok(id)
    }

    pub async fn list_all(&self) -> Result<Vec<ContextDocument>, AdminError> {
        self.store
            .get_all(&self.index, self.list_limit)
            .await
            .map_err(AdminError::tag("list"))
    }

    pub async fn get(&self, id: &str) -> Result<ContextDocument, AdminError> {
        self.store
            .get(&self.index, id)
            .await
            .map_err(AdminError::tag("get"))
    }

    pub async fn update(
        &self,
        id: &str,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<(), AdminError> {
        let patch = DocumentPatch { title, content };
        self.store
            .update(&self.index, id, &patch)
            .await
            .map_err(AdminError::tag("update"))?;
        info!(index = %self.index, id = %id, "context updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), AdminError> {
        self.store
            .delete(&self.index, id)
            .await
            .map_err(AdminError::tag("delete"))?;
        info!(index = %self.index, id = %id, "context deleted");
        Ok(())
    }

    /// Index [`SAMPLE_CORPUS`], returning the ids of newly added documents.
    pub async fn seed_sample_corpus(&self, mode: SeedMode) -> Result<Vec<String>, AdminError> {
        self.store
            .ensure_index(&self.index)
            .await
            .map_err(AdminError::tag("seed"))?;

        let mut added = Vec::new();
        for (title, content) in SAMPLE_CORPUS {
            if mode == SeedMode::SkipExisting
                && self
                    .store
                    .title_exists(&self.index, title)
                    .await
                    .map_err(AdminError::tag("seed"))?
            {
                continue;
            }
            let id = self
                .store
                .index_document(&self.index, &NewDocument::new(title, content))
                .await
                .map_err(AdminError::tag("seed"))?;
            added.push(id);
        }
        info!(index = %self.index, added = added.len(), ?mode, "sample corpus seeded");
        Ok(added)
    }
}
