// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retrieve, rerank and re-query loop.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use aiko_config::model::RetrievalConfig;
use aiko_core::{Conversation, Digest, Message, Query, Scope, SourceFailure};
use aiko_retrieval::{RerankContext, Reranker, Retriever};

use crate::evaluator::Evaluator;

/// Stop conditions for the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Last iteration index; the loop runs at most `max_depth + 1` times.
    pub max_depth: u32,
    /// Digest confidence at which no further iteration is attempted.
    pub relevance_threshold: f32,
}

impl From<&RetrievalConfig> for LoopSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            relevance_threshold: config.relevance_threshold,
        }
    }
}

/// What the loop produced.
#[derive(Debug, Clone, Default)]
pub struct LoopReport {
    /// Digest of the last iteration that ran, or empty when none did.
    pub digest: Digest,
    /// Retrieval passes performed.
    pub iterations: u32,
    /// Every query issued, in order.
    pub queries: Vec<Query>,
    pub failures: Vec<SourceFailure>,
}

/// Accumulated loop state, moved from one iteration to the next.
#[derive(Debug, Default)]
struct LoopState {
    pending: Vec<Query>,
    asked: HashSet<String>,
    report: LoopReport,
}

impl LoopState {
    fn new(initial: Vec<Query>) -> Self {
        let mut state = Self::default();
        state.pending = state.admit(initial);
        state
    }

    /// Keep only queries not asked before, recording them as asked.
    fn admit(&mut self, queries: Vec<Query>) -> Vec<Query> {
        queries
            .into_iter()
            .filter(|q| self.asked.insert(q.dedup_key()))
            .collect()
    }
}

pub struct RetrievalLoop {
    retriever: Arc<Retriever>,
    reranker: Arc<Reranker>,
    evaluator: Arc<dyn Evaluator>,
    settings: LoopSettings,
}

impl RetrievalLoop {
    pub fn new(
        retriever: Arc<Retriever>,
        reranker: Arc<Reranker>,
        evaluator: Arc<dyn Evaluator>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            retriever,
            reranker,
            evaluator,
            settings,
        }
    }

    /// Run iterations `0..=max_depth` starting from `queries`.
    ///
    /// Stops after an iteration whose digest reaches the relevance threshold,
    /// after iteration `max_depth`, or as soon as there is nothing new to ask.
    /// Source failures never abort the loop.
    pub async fn run(
        &self,
        conversation: &Conversation,
        message: &Message,
        queries: Vec<Query>,
        scope: &Scope,
    ) -> LoopReport {
        let mut state = LoopState::new(queries);

        for depth in 0..=self.settings.max_depth {
            if state.pending.is_empty() {
                debug!(scope = %scope, depth, "no queries left, stopping");
                break;
            }
            state = self.iterate(state, message, scope).await;

            let confidence = state.report.digest.overall_confidence;
            if confidence >= self.settings.relevance_threshold || depth == self.settings.max_depth {
                break;
            }

            let next = self
                .evaluator
                .follow_up(conversation, message, &state.report.digest, depth + 1)
                .await
                .into_iter()
                .map(|mut q| {
                    q.origin_depth = depth + 1;
                    q
                })
                .collect();
            state.pending = state.admit(next);
        }

        let report = state.report;
        info!(
            scope = %scope,
            iterations = report.iterations,
            items = report.digest.items.len(),
            confidence = report.digest.overall_confidence,
            failures = report.failures.len(),
            "retrieval loop finished"
        );
        report
    }

    async fn iterate(&self, mut state: LoopState, message: &Message, scope: &Scope) -> LoopState {
        let queries = std::mem::take(&mut state.pending);
        let outcome = self.retriever.retrieve(&queries, scope).await;
        let context = RerankContext {
            message: message.text.clone(),
            queries: queries.clone(),
        };
        let digest = self.reranker.rerank_and_summarize(outcome.items, &context).await;
        debug!(
            scope = %scope,
            iteration = state.report.iterations,
            queries = queries.len(),
            items = digest.items.len(),
            confidence = digest.overall_confidence,
            "retrieval iteration done"
        );

        state.report.iterations += 1;
        state.report.digest = digest;
        state.report.queries.extend(queries);
        state.report.failures.extend(outcome.failures);
        state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use aiko_config::model::RerankConfig;
    use aiko_core::{MemorySource, UserId};
    use aiko_memory::{Memory, VectorMemoryStore};
    use aiko_retrieval::RetrieverSettings;
    use aiko_test_utils::MockEmbedder;

    use super::*;
    use crate::evaluator::Evaluation;

    /// Answers every follow-up with one fresh query.
    struct CountingEvaluator {
        follow_ups: AtomicU32,
    }

    #[async_trait]
    impl Evaluator for CountingEvaluator {
        async fn evaluate(&self, _: &Conversation, _: &Message) -> Evaluation {
            Evaluation::empty(1.0)
        }

        async fn follow_up(&self, _: &Conversation, _: &Message, _: &Digest, depth: u32) -> Vec<Query> {
            self.follow_ups.fetch_add(1, Ordering::SeqCst);
            vec![Query::new(format!("follow up {depth}"), depth)]
        }
    }

    struct Fixture {
        embedder: Arc<MockEmbedder>,
        evaluator: Arc<CountingEvaluator>,
        controller: RetrievalLoop,
    }

    fn fixture(max_depth: u32, relevance_threshold: f32) -> Fixture {
        let embedder = Arc::new(MockEmbedder::new());
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        let scope = Scope::new("u1", "aiko");
        let text = "user's dog is named rex";
        store
            .insert(Memory::new(&scope, text, embedder.vector(text), MemorySource::Extracted, 0.6))
            .unwrap();

        let retriever = Arc::new(Retriever::new(
            store,
            embedder.clone(),
            None,
            RetrieverSettings::default(),
        ));
        let evaluator = Arc::new(CountingEvaluator {
            follow_ups: AtomicU32::new(0),
        });
        let controller = RetrievalLoop::new(
            retriever,
            Arc::new(Reranker::lexical(&RerankConfig::default())),
            evaluator.clone(),
            LoopSettings {
                max_depth,
                relevance_threshold,
            },
        );
        Fixture {
            embedder,
            evaluator,
            controller,
        }
    }

    fn message(text: &str) -> (Conversation, Message) {
        let message = Message::from_user(&UserId("u1".into()), text);
        let mut conversation = Conversation::new();
        conversation.push(message.clone());
        (conversation, message)
    }

    #[tokio::test]
    async fn empty_queries_make_no_calls() {
        let f = fixture(3, 0.9);
        let (conversation, msg) = message("hi");
        let report = f
            .controller
            .run(&conversation, &msg, Vec::new(), &Scope::new("u1", "aiko"))
            .await;

        assert_eq!(report.iterations, 0);
        assert!(report.digest.is_empty());
        assert_eq!(report.digest.overall_confidence, 0.0);
        assert_eq!(f.embedder.calls(), 0);
        assert_eq!(f.evaluator.follow_ups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn max_depth_zero_is_a_single_pass() {
        let f = fixture(0, 1.0);
        let (conversation, msg) = message("what is my dog called");
        let report = f
            .controller
            .run(&conversation, &msg, vec![Query::new("dog name", 0)], &Scope::new("u1", "aiko"))
            .await;

        assert_eq!(report.iterations, 1);
        assert_eq!(f.evaluator.follow_ups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_threshold_runs_to_max_depth() {
        let f = fixture(2, 1.1);
        let (conversation, msg) = message("what is my dog called");
        let report = f
            .controller
            .run(&conversation, &msg, vec![Query::new("dog name", 0)], &Scope::new("u1", "aiko"))
            .await;

        assert_eq!(report.iterations, 3);
        assert_eq!(f.evaluator.follow_ups.load(Ordering::SeqCst), 2);
        let depths: Vec<u32> = report.queries.iter().map(|q| q.origin_depth).collect();
        assert_eq!(depths, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn reached_threshold_stops_early() {
        let f = fixture(3, 0.0);
        let (conversation, msg) = message("what is my dog called");
        let report = f
            .controller
            .run(&conversation, &msg, vec![Query::new("dog name", 0)], &Scope::new("u1", "aiko"))
            .await;

        assert_eq!(report.iterations, 1);
        assert_eq!(f.evaluator.follow_ups.load(Ordering::SeqCst), 0);
    }
}
