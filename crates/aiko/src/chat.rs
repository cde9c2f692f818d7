// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `aiko chat` command implementation.
//!
//! Opens the memory store, wires the pipeline against the configured
//! OpenAI-compatible provider and web search endpoint, and runs a readline
//! REPL for one user. Memories are saved on `/save` and on exit.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};

use aiko_agent::{Adapters, Orchestrator, assemble, refiner_from_config};
use aiko_config::AikoConfig;
use aiko_core::{AikoError, EmbeddingAdapter, GeneratorAdapter, Message, UserId, WebSearchAdapter};
use aiko_memory::VectorMemoryStore;
use aiko_openai::{OpenAiEmbedder, OpenAiGenerator, client_from_config};
use aiko_retrieval::{PageFetcher, SearxSearch};

/// Runs the interactive chat loop as `user_id`.
pub async fn run_chat(
    config: AikoConfig,
    user_id: String,
    display_name: Option<String>,
) -> Result<(), AikoError> {
    let orchestrator = build_orchestrator(&config).await?;
    let user = UserId(user_id);
    let label = display_name.unwrap_or_else(|| user.to_string());
    let character_name = orchestrator.character().display_name.clone();

    let mut rl = DefaultEditor::new()
        .map_err(|e| AikoError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", format!("chatting with {character_name}").bold().green());
    println!(
        "Type {} to store memories, {} to exit.\n",
        "/save".yellow(),
        "/quit".yellow()
    );

    let prompt = format!("{}> ", label.green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                match trimmed {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/save" => {
                        save(&orchestrator).await;
                        continue;
                    }
                    _ => {}
                }
                let _ = rl.add_history_entry(&line);

                match orchestrator.handle(Message::from_user(&user, trimmed)).await {
                    Ok(outcome) => match outcome.reply {
                        Some(reply) => println!("{}: {reply}", character_name.magenta().bold()),
                        None => println!("{}", format!("({character_name} stays quiet)").dimmed()),
                    },
                    Err(e) => eprintln!("{}: {e}", "error".red()),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    save(&orchestrator).await;
    Ok(())
}

async fn build_orchestrator(config: &AikoConfig) -> Result<Orchestrator, AikoError> {
    let store = Arc::new(VectorMemoryStore::open(&config.storage).await?);
    info!(memories = store.total_len(), path = %config.storage.database_path, "memory store opened");

    let client = client_from_config(&config.provider)?;
    let generator: Arc<dyn GeneratorAdapter> = Arc::new(OpenAiGenerator::new(
        Arc::clone(&client),
        config.provider.chat_model.clone(),
    ));
    let embedder: Arc<dyn EmbeddingAdapter> = Arc::new(OpenAiEmbedder::new(
        client,
        config.provider.embedding_model.clone(),
        config.storage.embedding_dim,
    ));

    let web: Option<Arc<dyn WebSearchAdapter>> = if config.retrieval.web_enabled {
        Some(Arc::new(SearxSearch::new(
            config.web.endpoint.clone(),
            Duration::from_millis(config.retrieval.web_timeout_ms),
        )?))
    } else {
        info!("web retrieval disabled by configuration");
        None
    };

    let pages = if web.is_some() && config.web.fetch_pages {
        Some(Arc::new(PageFetcher::from_config(&config.web)?))
    } else {
        None
    };

    assemble(
        config,
        store,
        Adapters {
            generator,
            embedder,
            web,
            pages,
            refiner: refiner_from_config(&config.refiner)?,
        },
    )
}

async fn save(orchestrator: &Orchestrator) {
    match orchestrator.save().await {
        Ok(report) => println!(
            "{}",
            format!(
                "saved {} memories ({} removed) across {} conversations",
                report.upserts, report.deletes, report.scopes
            )
            .dimmed()
        ),
        Err(e) => {
            warn!(error = %e, "saving memories failed");
            eprintln!("{}: {e}", "error".red());
        }
    }
}
