//! # RAG Harness
//!
//! A retrieval-augmented generation service. Queries are matched against a
//! keyword-searchable corpus in Elasticsearch; the top hits are folded into
//! a prompt for a local Ollama model, whose answer is returned whole or
//! streamed as server-sent events.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!  HTTP / CLI ──▶│ RagOrchestrator              │
//!                │  retrieve ─▶ compose ─▶ gen  │
//!                └──────┬────────────────┬──────┘
//!                       ▼                ▼
//!               ┌──────────────┐  ┌─────────────┐
//!               │ ElasticStore │  │   Ollama    │
//!               └──────────────┘  └─────────────┘
//! ```
//!
//! The transport-free pieces (models, errors, the orchestrator, context
//! administration) live in `rag-harness-core`. This crate supplies the
//! backends, configuration, logging, and the HTTP surface.
//!
//! ## Quick Start
//!
//! ```bash
//! ragd seed                          # index the sample corpus
//! ragd ask "What is AI?" --stream    # run the pipeline from the CLI
//! ragd serve                         # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`elastic`] | Elasticsearch document store |
//! | [`ollama`] | Ollama generator |
//! | [`app`] | Service wiring |
//! | [`commands`] | `ragd` subcommands |
//! | [`server`] | HTTP server |

pub mod app;
pub mod commands;
pub mod config;
pub mod elastic;
pub mod logging;
pub mod ollama;
pub mod server;
