// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval for Aiko: concurrent lookups in scoped local memory and on the
//! web, and the reranker that condenses their results into a digest.

pub mod rerank;
pub mod retriever;
pub mod web;

pub use rerank::{EmbeddingScorer, LexicalScorer, RerankContext, Reranker, ScoringStrategy};
pub use retriever::{RetrievalOutcome, Retriever, RetrieverSettings};
pub use web::{PageFetcher, SearxSearch, WebResultFilter, readable_text};
