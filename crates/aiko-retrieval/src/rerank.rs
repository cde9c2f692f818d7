// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reranking and summarization of retrieved items into a [`Digest`].
//!
//! Items from different sources carry raw scores that are not comparable, so
//! every item is rescored by a [`ScoringStrategy`] against the query that
//! produced it and against the user's message. The digest is the best
//! `max_items` distinct items, each with a one-sentence short form.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use aiko_config::model::RerankConfig;
use aiko_core::retrieval::normalize_text;
use aiko_core::types::EmbeddingInput;
use aiko_core::{AikoError, Digest, DigestItem, EmbeddingAdapter, Query, RetrievedItem};
use aiko_memory::types::{cosine_similarity, normalize};
use aiko_resilience::with_timeout;

/// What the retrieved items are judged against.
#[derive(Debug, Clone, Default)]
pub struct RerankContext {
    /// The user message being answered.
    pub message: String,
    /// The queries issued in this iteration.
    pub queries: Vec<Query>,
}

/// Scores items for relevance in `[0, 1]`.
#[async_trait]
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// One score per item, index-aligned with `items`.
    async fn score(
        &self,
        items: &[RetrievedItem],
        context: &RerankContext,
    ) -> Result<Vec<f32>, AikoError>;
}

/// Term-frequency cosine between word bags. Needs no external service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn relevance(&self, text: &str, reference: &str) -> f32 {
        let a = term_frequencies(text);
        let b = term_frequencies(reference);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let dot: f32 = a
            .iter()
            .filter_map(|(term, x)| b.get(term).map(|y| x * y))
            .sum();
        let norm = |m: &HashMap<String, f32>| m.values().map(|v| v * v).sum::<f32>().sqrt();
        clamp_score(dot / (norm(&a) * norm(&b)))
    }

    fn item_score(&self, item: &RetrievedItem, context: &RerankContext) -> f32 {
        self.relevance(&item.content, &item.origin_query.text)
            .max(self.relevance(&item.content, &context.message))
    }
}

#[async_trait]
impl ScoringStrategy for LexicalScorer {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn score(
        &self,
        items: &[RetrievedItem],
        context: &RerankContext,
    ) -> Result<Vec<f32>, AikoError> {
        Ok(items.iter().map(|item| self.item_score(item, context)).collect())
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut terms = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

/// Cosine similarity of embeddings. Vectors are normalized first, so the
/// embedder may return vectors of any length.
///
/// Fails as a whole only when the message cannot be embedded. An item (or
/// query) that fails to embed is scored lexically instead.
pub struct EmbeddingScorer {
    embedder: Arc<dyn EmbeddingAdapter>,
    timeout: Duration,
    lexical: LexicalScorer,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn EmbeddingAdapter>, timeout: Duration) -> Self {
        Self {
            embedder,
            timeout,
            lexical: LexicalScorer,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AikoError> {
        let output = with_timeout(self.timeout, self.embedder.embed(EmbeddingInput::new(text))).await?;
        Ok(normalize(output.embedding))
    }
}

#[async_trait]
impl ScoringStrategy for EmbeddingScorer {
    fn name(&self) -> &'static str {
        "embedding"
    }

    async fn score(
        &self,
        items: &[RetrievedItem],
        context: &RerankContext,
    ) -> Result<Vec<f32>, AikoError> {
        let message = self.embed(&context.message).await?;

        let mut query_texts: Vec<&str> = items.iter().map(|i| i.origin_query.text.as_str()).collect();
        query_texts.sort_unstable();
        query_texts.dedup();
        let query_vectors: HashMap<&str, Vec<f32>> = join_all(query_texts.iter().map(|q| self.embed(q)))
            .await
            .into_iter()
            .zip(&query_texts)
            .filter_map(|(result, text)| result.ok().map(|v| (*text, v)))
            .collect();

        let item_vectors = join_all(items.iter().map(|i| self.embed(&i.content))).await;

        Ok(items
            .iter()
            .zip(item_vectors)
            .map(|(item, vector)| match vector {
                Ok(vector) => {
                    let to_message = cosine_similarity(&vector, &message);
                    let to_query = match query_vectors.get(item.origin_query.text.as_str()) {
                        Some(query) => cosine_similarity(&vector, query),
                        None => self.lexical.relevance(&item.content, &item.origin_query.text),
                    };
                    clamp_score(to_message.max(to_query))
                }
                Err(_) => self.lexical.item_score(item, context),
            })
            .collect())
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}

/// Turns retrieved items into a bounded, ordered, deduplicated digest.
pub struct Reranker {
    scorer: Arc<dyn ScoringStrategy>,
    fallback: LexicalScorer,
    max_items: usize,
    short_form_chars: usize,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn ScoringStrategy>, config: &RerankConfig) -> Self {
        Self {
            scorer,
            fallback: LexicalScorer,
            max_items: config.max_items,
            short_form_chars: config.short_form_chars,
        }
    }

    pub fn lexical(config: &RerankConfig) -> Self {
        Self::new(Arc::new(LexicalScorer), config)
    }

    /// Rescore, order, deduplicate and truncate `items`, then summarize.
    ///
    /// The result depends only on the multiset of items and the context, not
    /// on the order items arrive in. An empty input gives an empty digest
    /// with zero confidence.
    pub async fn rerank_and_summarize(
        &self,
        items: Vec<RetrievedItem>,
        context: &RerankContext,
    ) -> Digest {
        let items: Vec<RetrievedItem> = items
            .into_iter()
            .filter(|i| !i.content.trim().is_empty())
            .collect();
        if items.is_empty() {
            return Digest::empty();
        }

        let scores = match self.scorer.score(&items, context).await {
            Ok(scores) if scores.len() == items.len() => scores,
            Ok(_) => {
                warn!(scorer = self.scorer.name(), "scorer returned wrong number of scores, using lexical");
                self.fallback_scores(&items, context)
            }
            Err(err) => {
                warn!(scorer = self.scorer.name(), error = %err, "scoring failed, using lexical");
                self.fallback_scores(&items, context)
            }
        };

        let mut ranked: Vec<DigestItem> = items
            .into_iter()
            .zip(scores)
            .map(|(item, score)| DigestItem {
                short_form: short_form(&item.content, self.short_form_chars),
                source_kind: item.source_kind,
                content: item.content,
                score: clamp_score(score),
                origin_query: item.origin_query,
            })
            .collect();
        ranked.sort_by(digest_order);

        let mut seen = HashSet::new();
        ranked.retain(|item| seen.insert(normalize_text(&item.content)));
        ranked.truncate(self.max_items);

        let overall_confidence = confidence(&ranked, &context.queries);
        let overall_summary = ranked
            .iter()
            .map(|item| format!("- {}", item.short_form))
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            items = ranked.len(),
            confidence = overall_confidence,
            scorer = self.scorer.name(),
            "digest built"
        );
        Digest {
            items: ranked,
            overall_summary,
            overall_confidence,
        }
    }

    fn fallback_scores(&self, items: &[RetrievedItem], context: &RerankContext) -> Vec<f32> {
        items.iter().map(|i| self.fallback.item_score(i, context)).collect()
    }
}

/// Score descending, then content, source kind and origin query ascending.
fn digest_order(a: &DigestItem, b: &DigestItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.content.cmp(&b.content))
        .then_with(|| a.source_kind.cmp(&b.source_kind))
        .then_with(|| a.origin_query.text.cmp(&b.origin_query.text))
        .then_with(|| a.origin_query.origin_depth.cmp(&b.origin_query.origin_depth))
}

/// Mean over queries of the best digest score each query produced.
///
/// Falls back to the origin queries of the digest items when no queries were
/// given.
fn confidence(items: &[DigestItem], queries: &[Query]) -> f32 {
    if items.is_empty() {
        return 0.0;
    }
    let mut keys: Vec<String> = if queries.is_empty() {
        items.iter().map(|i| i.origin_query.dedup_key()).collect()
    } else {
        queries.iter().map(Query::dedup_key).collect()
    };
    keys.sort_unstable();
    keys.dedup();

    let total: f32 = keys
        .iter()
        .map(|key| {
            items
                .iter()
                .filter(|i| &i.origin_query.dedup_key() == key)
                .map(|i| i.score)
                .fold(0.0, f32::max)
        })
        .sum();
    clamp_score(total / keys.len() as f32)
}

/// First sentence of `content`, capped at `max_chars` characters.
pub fn short_form(content: &str, max_chars: usize) -> String {
    let content = content.trim();
    let mut end = content.len();
    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\n' {
            end = i;
            break;
        }
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|(_, next)| next.is_whitespace())
        {
            end = i + c.len_utf8();
            break;
        }
    }
    let sentence = content[..end].trim();

    if sentence.chars().count() <= max_chars {
        return sentence.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut capped: String = sentence.chars().take(max_chars - 1).collect();
    capped.truncate(capped.trim_end().len());
    capped.push('…');
    capped
}

#[cfg(test)]
mod tests {
    use aiko_core::{SourceKind, SourceMetadata};
    use aiko_test_utils::MockEmbedder;

    use super::*;

    fn item(kind: SourceKind, content: &str, query: &str) -> RetrievedItem {
        RetrievedItem {
            source_kind: kind,
            content: content.to_string(),
            raw_score: 0.5,
            origin_query: Query::new(query, 0),
            source_metadata: SourceMetadata::Web {
                url: "https://example.org".into(),
                title: String::new(),
                rank: 0,
            },
        }
    }

    fn config(max_items: usize) -> RerankConfig {
        RerankConfig {
            max_items,
            ..RerankConfig::default()
        }
    }

    fn context(message: &str, queries: &[&str]) -> RerankContext {
        RerankContext {
            message: message.to_string(),
            queries: queries.iter().map(|q| Query::new(*q, 0)).collect(),
        }
    }

    #[test]
    fn short_form_takes_first_sentence() {
        assert_eq!(short_form("Rex is a dog. He likes bones.", 100), "Rex is a dog.");
        assert_eq!(short_form("Version 1.5 shipped today", 100), "Version 1.5 shipped today");
        assert_eq!(short_form("first line\nsecond line", 100), "first line");
    }

    #[test]
    fn short_form_caps_on_char_boundary() {
        let capped = short_form("ééééééééé", 5);
        assert_eq!(capped.chars().count(), 5);
        assert!(capped.ends_with('…'));
    }

    #[test]
    fn lexical_relevance_bounds() {
        let scorer = LexicalScorer;
        assert!((scorer.relevance("dog named rex", "Dog named Rex") - 1.0).abs() < 1e-6);
        assert_eq!(scorer.relevance("dog", "weather"), 0.0);
        assert_eq!(scorer.relevance("", "weather"), 0.0);
        let partial = scorer.relevance("my dog is called rex", "dog names");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[tokio::test]
    async fn empty_items_give_empty_digest() {
        let digest = Reranker::lexical(&config(5))
            .rerank_and_summarize(Vec::new(), &context("hi", &["q"]))
            .await;
        assert!(digest.is_empty());
        assert_eq!(digest.overall_confidence, 0.0);
        assert!(digest.overall_summary.is_empty());
    }

    #[tokio::test]
    async fn dedups_and_truncates_best_first() {
        let items = vec![
            item(SourceKind::Web, "Weather is sunny", "dog names"),
            item(SourceKind::Local, "User has a dog named Rex.", "dog names"),
            item(SourceKind::Web, "user has a  DOG named rex.", "dog names"),
            item(SourceKind::Web, "Popular dog names include Rex and Max.", "dog names"),
        ];
        let digest = Reranker::lexical(&config(2))
            .rerank_and_summarize(items, &context("what should I name my dog?", &["dog names"]))
            .await;

        assert_eq!(digest.items.len(), 2);
        let keys: HashSet<_> = digest.items.iter().map(|i| normalize_text(&i.content)).collect();
        assert_eq!(keys.len(), 2);
        assert!(digest.items[0].score >= digest.items[1].score);
        assert!(!digest.items.iter().any(|i| i.content.contains("Weather")));
        assert_eq!(digest.overall_summary.lines().count(), 2);
        assert!(digest.overall_confidence > 0.0 && digest.overall_confidence <= 1.0);
    }

    #[tokio::test]
    async fn confidence_counts_queries_without_items() {
        let items = vec![item(SourceKind::Local, "dog named rex", "dog named rex")];
        let digest = Reranker::lexical(&config(5))
            .rerank_and_summarize(items, &context("unrelated", &["dog named rex", "weather today"]))
            .await;
        assert!((digest.overall_confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn embedding_scorer_falls_back_when_message_fails() {
        let embedder = Arc::new(MockEmbedder::failing());
        let reranker = Reranker::new(
            Arc::new(EmbeddingScorer::new(embedder, Duration::from_secs(1))),
            &config(5),
        );
        let lexical = Reranker::lexical(&config(5));
        let items = vec![
            item(SourceKind::Local, "dog named rex", "dog"),
            item(SourceKind::Web, "cats are independent", "dog"),
        ];
        let ctx = context("tell me about my dog", &["dog"]);

        let a = reranker.rerank_and_summarize(items.clone(), &ctx).await;
        let b = lexical.rerank_and_summarize(items, &ctx).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embedding_scorer_prefers_related_items() {
        let embedder = Arc::new(MockEmbedder::new());
        let reranker = Reranker::new(
            Arc::new(EmbeddingScorer::new(embedder, Duration::from_secs(1))),
            &config(5),
        );
        let items = vec![
            item(SourceKind::Web, "stock prices fell sharply", "dog name"),
            item(SourceKind::Local, "the dog is named rex", "dog name"),
        ];
        let digest = reranker
            .rerank_and_summarize(items, &context("what is the dog named", &["dog name"]))
            .await;
        assert_eq!(digest.items[0].content, "the dog is named rex");
        assert!(digest.items.iter().all(|i| (0.0..=1.0).contains(&i.score)));
    }

    #[tokio::test]
    async fn embedding_scores_ignore_vector_length() {
        let rerank_with = |embedder: MockEmbedder| {
            Reranker::new(
                Arc::new(EmbeddingScorer::new(Arc::new(embedder), Duration::from_secs(1))),
                &config(5),
            )
        };
        let items = vec![
            item(SourceKind::Local, "the dog is named rex", "dog named"),
            item(SourceKind::Web, "a dog walked in the park near the river at dawn", "dog named"),
        ];
        let ctx = context("what is the dog named", &["dog named"]);

        let unit = rerank_with(MockEmbedder::new())
            .rerank_and_summarize(items.clone(), &ctx)
            .await;
        let scaled = rerank_with(MockEmbedder::scaled(10.0))
            .rerank_and_summarize(items, &ctx)
            .await;

        assert_eq!(scaled.items[0].content, "the dog is named rex");
        assert!(scaled.overall_confidence < 1.0);
        for (a, b) in unit.items.iter().zip(&scaled.items) {
            assert_eq!(a.content, b.content);
            assert!((a.score - b.score).abs() < 1e-4);
        }
        assert!((unit.overall_confidence - scaled.overall_confidence).abs() < 1e-4);
    }
}
