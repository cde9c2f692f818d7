// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Termination and provenance properties of the retrieval loop.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use aiko_agent::{Evaluation, Evaluator, LoopSettings, RetrievalLoop};
use aiko_config::model::RerankConfig;
use aiko_core::{Conversation, Digest, MemorySource, Message, Query, Scope, UserId};
use aiko_memory::{Memory, VectorMemoryStore};
use aiko_retrieval::{Reranker, Retriever, RetrieverSettings};
use aiko_test_utils::MockEmbedder;

const FACTS: &[&str] = &[
    "user's dog is named rex",
    "user likes long walks in the park",
    "user works as a nurse",
    "user's favourite food is ramen",
];

/// Always has another query to ask.
struct Insatiable {
    per_round: usize,
}

#[async_trait]
impl Evaluator for Insatiable {
    async fn evaluate(&self, _: &Conversation, _: &Message) -> Evaluation {
        Evaluation::empty(1.0)
    }

    async fn follow_up(&self, _: &Conversation, _: &Message, _: &Digest, depth: u32) -> Vec<Query> {
        (0..self.per_round)
            .map(|i| Query::new(format!("user {} round {depth} part {i}", FACTS[i % FACTS.len()]), depth))
            .collect()
    }
}

fn controller(max_depth: u32, relevance_threshold: f32, per_round: usize) -> RetrievalLoop {
    let embedder = Arc::new(MockEmbedder::new());
    let store = Arc::new(VectorMemoryStore::in_memory(None));
    let scope = Scope::new("u1", "aiko");
    for fact in FACTS {
        store
            .insert(Memory::new(&scope, *fact, embedder.vector(fact), MemorySource::Extracted, 0.6))
            .unwrap();
    }
    let retriever = Arc::new(Retriever::new(store, embedder, None, RetrieverSettings::default()));
    RetrievalLoop::new(
        retriever,
        Arc::new(Reranker::lexical(&RerankConfig::default())),
        Arc::new(Insatiable { per_round }),
        LoopSettings {
            max_depth,
            relevance_threshold,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn loop_is_bounded_and_items_come_from_asked_queries(
        max_depth in 0u32..6,
        relevance_threshold in 0.0f32..=1.0,
        per_round in 0usize..4,
        initial in prop::collection::vec(prop::sample::select(FACTS), 0..4),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let message = Message::from_user(&UserId("u1".into()), "tell me about myself");
        let mut conversation = Conversation::new();
        conversation.push(message.clone());
        let queries: Vec<Query> = initial.iter().map(|q| Query::new(*q, 0)).collect();

        let report = runtime.block_on(
            controller(max_depth, relevance_threshold, per_round)
                .run(&conversation, &message, queries.clone(), &Scope::new("u1", "aiko")),
        );

        prop_assert!(report.iterations <= max_depth + 1);
        if queries.is_empty() {
            prop_assert_eq!(report.iterations, 0);
            prop_assert!(report.digest.is_empty());
        }

        let asked: HashSet<&str> = report.queries.iter().map(|q| q.text.as_str()).collect();
        prop_assert!(report.digest.items.iter().all(|i| asked.contains(i.origin_query.text.as_str())));
        prop_assert!(report.queries.iter().all(|q| q.origin_depth <= max_depth));
        prop_assert!((0.0..=1.0).contains(&report.digest.overall_confidence));
    }
}
