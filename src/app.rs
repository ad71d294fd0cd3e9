//! Service wiring.
//!
//! [`Services`] is built once at startup from [`Config`] and cloned into
//! every consumer (HTTP handlers, CLI commands). It owns the only store and
//! generator handles in the process.

use std::sync::Arc;

use anyhow::Result;
use rag_harness_core::admin::ContextAdmin;
use rag_harness_core::agent::SearchAgent;
use rag_harness_core::generation::Generator;
use rag_harness_core::pipeline::RagOrchestrator;
use rag_harness_core::retrieve::ContextRetriever;
use rag_harness_core::store::DocumentStore;

use crate::config::Config;
use crate::elastic::ElasticStore;
use crate::ollama::OllamaGenerator;

#[derive(Clone)]
pub struct Services {
    pub rag: RagOrchestrator,
    pub agent: SearchAgent,
    pub admin: ContextAdmin,
    pub store: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn Generator>,
    /// Model used when a request does not name one.
    pub default_model: String,
}

impl Services {
    /// Connect to the configured Elasticsearch and Ollama backends.
    ///
    /// No network traffic happens here; backends are contacted lazily on
    /// first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(ElasticStore::new(&config.search)?);
        let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(&config.model)?);
        Ok(Self::with_backends(config, store, generator))
    }

    /// Assemble services around explicit backends.
    pub fn with_backends(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let retriever = ContextRetriever::new(store.clone(), config.retrieval_params());
        let rag = RagOrchestrator::new(retriever, generator.clone());
        Self {
            agent: SearchAgent::new(rag.clone(), config.agent.max_steps),
            rag,
            admin: ContextAdmin::new(
                store.clone(),
                config.search.index.clone(),
                config.search.list_limit,
            ),
            store,
            generator,
            default_model: config.model.default_model.clone(),
        }
    }
}
