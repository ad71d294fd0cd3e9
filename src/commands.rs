//! CLI command implementations for `ragd`.
//!
//! Each `run_*` function drives one subcommand against a [`Services`]
//! handle and prints human-readable output to stdout.

use std::io::Write;

use anyhow::{bail, Result};
use futures_util::StreamExt;
use rag_harness_core::admin::SeedMode;
use rag_harness_core::models::{GenerationRequest, SearchHit, StreamEvent};
use rag_harness_core::pipeline::EventStream;

use crate::app::Services;

const EXCERPT_CHARS: usize = 160;

fn excerpt(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}

fn print_hits(hits: &[SearchHit]) {
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, hit.score, hit.title);
        println!("    excerpt: \"{}\"", excerpt(&hit.content));
        println!("    id: {}", hit.id);
        println!();
    }
}

pub async fn run_seed(services: &Services, mode: SeedMode) -> Result<()> {
    let added = services.admin.seed_sample_corpus(mode).await?;
    if added.is_empty() {
        println!("Sample corpus already present; nothing added.");
    } else {
        println!(
            "Seeded {} sample document(s) into '{}'.",
            added.len(),
            services.admin.index()
        );
    }
    Ok(())
}

pub async fn run_search(services: &Services, query: &str) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let hits = services.rag.search(query).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_hits(&hits);
    Ok(())
}

pub async fn run_ask(
    services: &Services,
    query: &str,
    model: Option<String>,
    stream: bool,
) -> Result<()> {
    let request = GenerationRequest::new(query, model, &services.default_model)?;

    if !stream {
        let result = services.rag.run(&request).await?;
        println!("{}", result.generated_text);
        if !result.context_used.is_empty() {
            println!();
            println!("--- Context ({}) ---", result.context_used.len());
            print_hits(&result.context_used);
        }
        return Ok(());
    }

    print_events(services.rag.run_stream(request)).await
}

pub async fn run_agent(
    services: &Services,
    query: &str,
    model: Option<String>,
    stream: bool,
) -> Result<()> {
    let request = GenerationRequest::new(query, model, &services.default_model)?;
    if stream {
        return print_events(services.agent.stream(request)).await;
    }
    let response = services.agent.run(&request).await?;
    println!("{}", response);
    Ok(())
}

/// Print chunks as they arrive; an error event fails the command.
async fn print_events(mut events: EventStream) -> Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Chunk { text } => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::Error { message } => {
                writeln!(stdout)?;
                bail!(message);
            }
            StreamEvent::End => writeln!(stdout)?,
        }
    }
    Ok(())
}

pub async fn run_context_list(services: &Services) -> Result<()> {
    let docs = services.admin.list_all().await?;
    if docs.is_empty() {
        println!("No context documents.");
        return Ok(());
    }
    for doc in &docs {
        println!("{}  {}", doc.id, doc.title);
    }
    println!();
    println!("{} document(s) in '{}'.", docs.len(), services.admin.index());
    Ok(())
}

pub async fn run_context_add(services: &Services, title: &str, content: &str) -> Result<()> {
    let id = services.admin.add(title, content).await?;
    println!("Context added: {}", id);
    Ok(())
}

pub async fn run_context_update(
    services: &Services,
    id: &str,
    title: Option<String>,
    content: Option<String>,
) -> Result<()> {
    if title.is_none() && content.is_none() {
        bail!("Nothing to update: pass --title and/or --content");
    }
    services.admin.update(id, title, content).await?;
    println!("Context {} updated.", id);
    Ok(())
}

pub async fn run_context_delete(services: &Services, id: &str) -> Result<()> {
    services.admin.delete(id).await?;
    println!("Context {} deleted.", id);
    Ok(())
}
