// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Aiko dialogue pipeline.
//!
//! [`Orchestrator::handle`] takes one user message through evaluation, the
//! bounded retrieval loop, reply generation and refinement, and hands the
//! evaluator's memory drafts to the lifecycle manager in the background.
//! [`assemble`] wires every stage from an [`AikoConfig`].

pub mod evaluator;
pub mod loop_controller;
pub mod orchestrator;
pub mod prompt;
pub mod refiner;

use std::sync::Arc;
use std::time::Duration;

use aiko_config::AikoConfig;
use aiko_config::model::ScorerKind;
use aiko_core::{AikoError, EmbeddingAdapter, GeneratorAdapter, RefinerAdapter, WebSearchAdapter};
use aiko_memory::{MemoryLifecycleManager, VectorMemoryStore};
use aiko_resilience::RetryPolicy;
use aiko_retrieval::{EmbeddingScorer, PageFetcher, Reranker, Retriever, RetrieverSettings};

pub use evaluator::{Evaluation, Evaluator, EvaluatorSettings, LlmEvaluator};
pub use loop_controller::{LoopReport, LoopSettings, RetrievalLoop};
pub use orchestrator::{CommitHandle, Orchestrator, OrchestratorSettings, TurnOutcome};
pub use refiner::{PassthroughRefiner, StyleRefiner, refiner_from_config};

/// External services the pipeline talks to.
pub struct Adapters {
    pub generator: Arc<dyn GeneratorAdapter>,
    pub embedder: Arc<dyn EmbeddingAdapter>,
    /// `None` disables web retrieval regardless of configuration.
    pub web: Option<Arc<dyn WebSearchAdapter>>,
    /// Fetches result pages for their text; `None` keeps search snippets.
    pub pages: Option<Arc<PageFetcher>>,
    pub refiner: Arc<dyn RefinerAdapter>,
}

/// Wire an [`Orchestrator`] for the configured character over `store`.
pub fn assemble(
    config: &AikoConfig,
    store: Arc<VectorMemoryStore>,
    adapters: Adapters,
) -> Result<Orchestrator, AikoError> {
    let character = config.character.to_character();
    if character.id.0.trim().is_empty() {
        return Err(AikoError::Config("character id must not be empty".into()));
    }
    let retrieval = &config.retrieval;

    let retry = RetryPolicy::from(&config.resilience);
    let lifecycle = Arc::new(MemoryLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&adapters.embedder),
        retry,
        Duration::from_millis(retrieval.local_timeout_ms),
    ));

    let mut retriever = Retriever::new(
        store,
        Arc::clone(&adapters.embedder),
        adapters.web,
        RetrieverSettings::from_config(retrieval, &config.web),
    );
    if let Some(pages) = adapters.pages {
        retriever = retriever.with_page_fetcher(pages);
    }
    let retriever = Arc::new(retriever);

    let reranker = Arc::new(match config.rerank.scorer {
        ScorerKind::Embedding => Reranker::new(
            Arc::new(EmbeddingScorer::new(
                Arc::clone(&adapters.embedder),
                Duration::from_millis(retrieval.local_timeout_ms),
            )),
            &config.rerank,
        ),
        ScorerKind::Lexical => Reranker::lexical(&config.rerank),
    });

    let evaluator: Arc<dyn Evaluator> = Arc::new(LlmEvaluator::new(
        Arc::clone(&adapters.generator),
        character.clone(),
        EvaluatorSettings::from_config(&config.evaluator, &config.pipeline),
    ));

    let retrieval_loop = RetrievalLoop::new(
        retriever,
        reranker,
        Arc::clone(&evaluator),
        LoopSettings::from(retrieval),
    );

    Ok(Orchestrator::new(
        character,
        evaluator,
        retrieval_loop,
        lifecycle,
        adapters.generator,
        adapters.refiner,
        OrchestratorSettings::from(&config.pipeline),
    ))
}
