use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fable_core::config::FableCfg;
use fable_core::memory::{InMemoryIndex, QdrantIndex, VectorIndex};
use fable_core::pipeline::{Pipeline, Session};
use fable_llm::embedding::{EmbedProvider, MockEmbedder, RetryingEmbedder};
use fable_llm::provider::LlmProvider;
use rustyline::error::ReadlineError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = FableCfg::from_env();
    let mut notices: Vec<String> = Vec::new();

    let llm: Arc<dyn LlmProvider> = fable_llm::http::from_env()
        .map(|p| Arc::new(p) as _)
        .context("FABLE_LLM_MODEL and FABLE_LLM_API_KEY must be set")?;

    let embedder: Arc<dyn EmbedProvider> = match fable_llm::embedding::from_env(cfg.embed_dim) {
        Some(e) => Arc::new(e),
        None => {
            notices.push(
                "FABLE_EMBED_MODEL not set, using deterministic local vectors".into(),
            );
            Arc::new(MockEmbedder::new(cfg.embed_dim))
        }
    };
    let embedder: Arc<dyn EmbedProvider> = Arc::new(RetryingEmbedder::new(
        embedder,
        cfg.embed_max_attempts,
        Duration::from_millis(cfg.embed_backoff_ms),
    ));

    let index: Arc<dyn VectorIndex> = match std::env::var("FABLE_QDRANT_URL") {
        Ok(url) => Arc::new(QdrantIndex::new(url)),
        Err(_) => {
            notices.push(
                "FABLE_QDRANT_URL not set, memory is ephemeral for this session".into(),
            );
            Arc::new(InMemoryIndex::new())
        }
    };

    let pipeline = Pipeline::new(llm, index, embedder, cfg.clone());
    let mut session = Session::new(&cfg);

    for notice in &notices {
        println!("note: {notice}");
    }

    if let Some(path) = std::env::args().nth(1) {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading book file {path}"))?;
        println!("ingesting {path}...");
        let characters = pipeline.ingest_book(&mut session, &text).await?;
        let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
        println!("cast: {}", names.join(", "));
    } else {
        println!("no book file given; pass a path to talk to its characters");
    }

    run_repl(&pipeline, &mut session).await
}

async fn run_repl(pipeline: &Pipeline, session: &mut Session) -> anyhow::Result<()> {
    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "/quit" || text == "/exit" {
                    break;
                }
                let _ = rl.add_history_entry(text);

                match pipeline.chat(session, text).await {
                    Ok(reply) => match (&reply.character, &reply.emotion) {
                        (Some(name), Some((_, label))) => {
                            println!("{name} ({}): {}", label.as_str(), reply.text);
                        }
                        _ => println!("assistant: {}", reply.text),
                    },
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
