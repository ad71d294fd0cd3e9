//! # RAG Harness Core
//!
//! Transport-free logic for RAG Harness: data models, the error taxonomy,
//! the document store and generator abstractions, context retrieval,
//! prompt composition, the RAG orchestrator, the search agent, and context
//! administration.
//!
//! This crate contains no tokio, reqwest, axum, or other runtime-bound
//! dependencies. Concrete backends (Elasticsearch, Ollama) live in the
//! `rag-harness` app crate and plug in through [`store::DocumentStore`]
//! and [`generation::Generator`].
//!
//! ## Request flow
//!
//! ```text
//! caller ──▶ RagOrchestrator ──▶ ContextRetriever ──▶ DocumentStore::search
//!                 │
//!                 ├──▶ compose(query, hits)   (only when hits were found)
//!                 ▼
//!            Generator::generate / generate_stream ──▶ caller
//! ```

pub mod admin;
pub mod agent;
pub mod error;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod store;
