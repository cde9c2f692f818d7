// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrent fan-out of queries to local memory and web search.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, join_all};
use tracing::{debug, warn};

use aiko_config::model::{RetrievalConfig, WebConfig};
use aiko_core::types::{EmbeddingInput, WebSearchRequest};
use aiko_core::{
    AikoError, EmbeddingAdapter, Query, RetrievedItem, Scope, SourceFailure, SourceKind,
    SourceMetadata, WebSearchAdapter,
};
use aiko_memory::VectorMemoryStore;
use aiko_resilience::with_timeout;

use crate::web::{PageFetcher, WebResultFilter};

/// Knobs for one retriever, usually derived from [`RetrievalConfig`].
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub top_k: usize,
    pub min_local_similarity: f32,
    pub web_enabled: bool,
    pub web_limit: usize,
    pub local_timeout: Duration,
    pub web_timeout: Duration,
    pub min_snippet_words: usize,
}

impl RetrieverSettings {
    pub fn from_config(retrieval: &RetrievalConfig, web: &WebConfig) -> Self {
        Self {
            top_k: retrieval.top_k,
            min_local_similarity: retrieval.min_local_similarity,
            web_enabled: retrieval.web_enabled,
            web_limit: retrieval.web_limit,
            local_timeout: Duration::from_millis(retrieval.local_timeout_ms),
            web_timeout: Duration::from_millis(retrieval.web_timeout_ms),
            min_snippet_words: web.min_snippet_words,
        }
    }
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default(), &WebConfig::default())
    }
}

/// Items from every lookup that succeeded plus one entry per lookup that did not.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub items: Vec<RetrievedItem>,
    pub failures: Vec<SourceFailure>,
}

type Lookup<'a> = BoxFuture<'a, Result<Vec<RetrievedItem>, SourceFailure>>;

/// Runs every (query, source) lookup concurrently.
///
/// A slow or failing source never fails the call: its lookup contributes no
/// items and is reported in [`RetrievalOutcome::failures`].
pub struct Retriever {
    store: Arc<VectorMemoryStore>,
    embedder: Arc<dyn EmbeddingAdapter>,
    web: Option<Arc<dyn WebSearchAdapter>>,
    pages: Option<Arc<PageFetcher>>,
    filter: WebResultFilter,
    settings: RetrieverSettings,
}

impl Retriever {
    pub fn new(
        store: Arc<VectorMemoryStore>,
        embedder: Arc<dyn EmbeddingAdapter>,
        web: Option<Arc<dyn WebSearchAdapter>>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            filter: WebResultFilter::new(settings.min_snippet_words),
            store,
            embedder,
            web,
            pages: None,
            settings,
        }
    }

    /// Replace web snippets with the readable text of each result page.
    /// A page that cannot be fetched keeps its snippet.
    pub fn with_page_fetcher(mut self, pages: Arc<PageFetcher>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    /// Look every query up in local memory (restricted to `scope`) and, for
    /// queries that allow it, on the web.
    pub async fn retrieve(&self, queries: &[Query], scope: &Scope) -> RetrievalOutcome {
        if queries.is_empty() {
            return RetrievalOutcome::default();
        }

        let mut lookups: Vec<Lookup<'_>> = Vec::with_capacity(queries.len() * 2);
        for query in queries {
            lookups.push(self.local_lookup(query, scope).boxed());
            if let Some(web) = self.web_source(query) {
                lookups.push(self.web_lookup(web, query).boxed());
            }
        }

        let mut outcome = RetrievalOutcome::default();
        for result in join_all(lookups).await {
            match result {
                Ok(items) => outcome.items.extend(items),
                Err(failure) => {
                    warn!(
                        source = %failure.source_kind,
                        query = %failure.query,
                        reason = %failure.reason,
                        "retrieval source failed"
                    );
                    outcome.failures.push(failure);
                }
            }
        }
        debug!(
            scope = %scope,
            queries = queries.len(),
            items = outcome.items.len(),
            failures = outcome.failures.len(),
            "retrieval finished"
        );
        outcome
    }

    fn web_source(&self, query: &Query) -> Option<&Arc<dyn WebSearchAdapter>> {
        if !self.settings.web_enabled || !query.kind.allows_web() {
            return None;
        }
        self.web.as_ref()
    }

    async fn local_lookup(
        &self,
        query: &Query,
        scope: &Scope,
    ) -> Result<Vec<RetrievedItem>, SourceFailure> {
        let lookup = async {
            let output = self.embedder.embed(EmbeddingInput::new(&query.text)).await?;
            self.store.search(
                scope,
                &output.embedding,
                self.settings.top_k,
                self.settings.min_local_similarity,
            )
        };
        let found = with_timeout(self.settings.local_timeout, lookup)
            .await
            .map_err(|e| failure(SourceKind::Local, query, &e))?;

        Ok(found
            .into_iter()
            .map(|scored| RetrievedItem {
                source_kind: SourceKind::Local,
                content: scored.memory.text,
                raw_score: scored.similarity,
                origin_query: query.clone(),
                source_metadata: SourceMetadata::Memory {
                    memory_id: scored.memory.id,
                    created_at: scored.memory.created_at,
                },
            })
            .collect())
    }

    async fn web_lookup(
        &self,
        web: &Arc<dyn WebSearchAdapter>,
        query: &Query,
    ) -> Result<Vec<RetrievedItem>, SourceFailure> {
        let request = WebSearchRequest {
            query: query.text.clone(),
            limit: self.settings.web_limit,
            time_filter: query.time_relevance.time_filter(),
        };
        let hits = with_timeout(self.settings.web_timeout, web.search(request))
            .await
            .map_err(|e| failure(SourceKind::Web, query, &e))?;

        let hits: Vec<_> = hits
            .into_iter()
            .filter(|hit| self.filter.accepts(hit))
            .take(self.settings.web_limit)
            .collect();
        let contents = match &self.pages {
            Some(pages) => {
                join_all(hits.iter().map(|hit| async move {
                    match pages.fetch(&hit.url).await {
                        Ok(text) => text,
                        Err(err) => {
                            debug!(url = %hit.url, error = %err, "page unavailable, keeping snippet");
                            hit.snippet.clone()
                        }
                    }
                }))
                .await
            }
            None => hits.iter().map(|hit| hit.snippet.clone()).collect(),
        };

        Ok(hits
            .into_iter()
            .zip(contents)
            .enumerate()
            .map(|(rank, (hit, content))| RetrievedItem {
                source_kind: SourceKind::Web,
                content,
                raw_score: 1.0 / (1.0 + rank as f32),
                origin_query: query.clone(),
                source_metadata: SourceMetadata::Web {
                    url: hit.url,
                    title: hit.title,
                    rank,
                },
            })
            .collect())
    }
}

fn failure(source_kind: SourceKind, query: &Query, error: &AikoError) -> SourceFailure {
    SourceFailure {
        source_kind,
        query: query.text.clone(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use aiko_core::{MemorySource, QueryKind};
    use aiko_memory::Memory;
    use aiko_test_utils::{MockEmbedder, MockSearch, hit};

    use super::*;

    const LONG_SNIPPET: &str =
        "Rex is one of the most popular names for dogs and appears in many famous stories";

    fn scope(user: &str) -> Scope {
        Scope::new(user, "aiko")
    }

    fn seed(store: &VectorMemoryStore, embedder: &MockEmbedder, scope: &Scope, text: &str) {
        let memory = Memory::new(scope, text, embedder.vector(text), MemorySource::Extracted, 0.5);
        store.insert(memory).unwrap();
    }

    fn settings() -> RetrieverSettings {
        RetrieverSettings {
            min_snippet_words: 5,
            ..RetrieverSettings::default()
        }
    }

    #[tokio::test]
    async fn empty_queries_touch_no_source() {
        let embedder = Arc::new(MockEmbedder::new());
        let search = Arc::new(MockSearch::empty());
        let retriever = Retriever::new(
            Arc::new(VectorMemoryStore::in_memory(None)),
            embedder.clone(),
            Some(search.clone()),
            settings(),
        );

        let outcome = retriever.retrieve(&[], &scope("u1")).await;
        assert!(outcome.items.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn local_results_stay_in_scope() {
        let embedder = Arc::new(MockEmbedder::new());
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        seed(&store, &embedder, &scope("u1"), "user has a dog named rex");
        seed(&store, &embedder, &scope("u2"), "user has a dog named fido");

        let retriever = Retriever::new(store, embedder, None, settings());
        let outcome = retriever
            .retrieve(&[Query::new("dog name", 0)], &scope("u1"))
            .await;

        assert_eq!(outcome.items.len(), 1);
        let item = &outcome.items[0];
        assert_eq!(item.source_kind, SourceKind::Local);
        assert_eq!(item.content, "user has a dog named rex");
        assert_eq!(item.origin_query.text, "dog name");
        assert!(matches!(item.source_metadata, SourceMetadata::Memory { .. }));
    }

    #[tokio::test]
    async fn web_hits_are_filtered_and_ranked() {
        let search = Arc::new(MockSearch::with_hits(vec![
            hit("Video", LONG_SNIPPET, "https://www.youtube.com/watch?v=1"),
            hit("Short", "too short", "https://example.org/short"),
            hit("Names", LONG_SNIPPET, "https://example.org/names"),
            hit("More", "Dogs named Rex often belong to families who like short names", "https://example.net/more"),
        ]));
        let retriever = Retriever::new(
            Arc::new(VectorMemoryStore::in_memory(None)),
            Arc::new(MockEmbedder::new()),
            Some(search.clone()),
            settings(),
        );

        let outcome = retriever
            .retrieve(&[Query::new("famous dog names", 0)], &scope("u1"))
            .await;

        let web: Vec<_> = outcome
            .items
            .iter()
            .filter(|i| i.source_kind == SourceKind::Web)
            .collect();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].raw_score, 1.0);
        assert_eq!(web[1].raw_score, 0.5);
        assert!(matches!(
            &web[0].source_metadata,
            SourceMetadata::Web { url, rank: 0, .. } if url == "https://example.org/names"
        ));
        assert_eq!(search.calls(), 1);
    }

    #[tokio::test]
    async fn page_text_replaces_snippets_when_available() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/names"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(
                        "<html><body><p>Rex, Max and Buddy top the list of dog names \
                         chosen by families across the country this year.</p></body></html>",
                        "text/html",
                    ),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let search = Arc::new(MockSearch::with_hits(vec![
            hit("Names", LONG_SNIPPET, &format!("{}/names", server.uri())),
            hit("Gone", LONG_SNIPPET, &format!("{}/gone", server.uri())),
        ]));
        let pages = Arc::new(PageFetcher::new(Duration::from_secs(5), 10, 2_000).unwrap());
        let retriever = Retriever::new(
            Arc::new(VectorMemoryStore::in_memory(None)),
            Arc::new(MockEmbedder::new()),
            Some(search),
            settings(),
        )
        .with_page_fetcher(pages);

        let outcome = retriever
            .retrieve(&[Query::new("popular dog names", 0)], &scope("u1"))
            .await;

        let web: Vec<_> = outcome
            .items
            .iter()
            .filter(|i| i.source_kind == SourceKind::Web)
            .collect();
        assert_eq!(web.len(), 2);
        assert!(web[0].content.starts_with("Rex, Max and Buddy top the list"));
        assert_eq!(web[1].content, LONG_SNIPPET);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn personal_queries_skip_the_web() {
        let search = Arc::new(MockSearch::with_hits(vec![hit("x", LONG_SNIPPET, "https://example.org/x")]));
        let retriever = Retriever::new(
            Arc::new(VectorMemoryStore::in_memory(None)),
            Arc::new(MockEmbedder::new()),
            Some(search.clone()),
            settings(),
        );

        let query = Query::new("what is my dog called", 0).with_kind(QueryKind::Personal);
        retriever.retrieve(&[query], &scope("u1")).await;
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn failing_web_keeps_local_results() {
        let embedder = Arc::new(MockEmbedder::new());
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        seed(&store, &embedder, &scope("u1"), "user has a dog named rex");

        let retriever = Retriever::new(store, embedder, Some(Arc::new(MockSearch::failing())), settings());
        let outcome = retriever
            .retrieve(&[Query::new("dog named rex", 0)], &scope("u1"))
            .await;

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].source_kind, SourceKind::Web);
        assert_eq!(outcome.failures[0].query, "dog named rex");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_web_times_out() {
        let retriever = Retriever::new(
            Arc::new(VectorMemoryStore::in_memory(None)),
            Arc::new(MockEmbedder::new()),
            Some(Arc::new(MockSearch::hanging(Duration::from_secs(60)))),
            RetrieverSettings {
                web_timeout: Duration::from_millis(100),
                ..settings()
            },
        );

        let outcome = retriever.retrieve(&[Query::new("anything", 0)], &scope("u1")).await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn embedding_failure_is_a_local_failure() {
        let retriever = Retriever::new(
            Arc::new(VectorMemoryStore::in_memory(None)),
            Arc::new(MockEmbedder::failing()),
            None,
            settings(),
        );

        let outcome = retriever.retrieve(&[Query::new("a", 0), Query::new("b", 0)], &scope("u1")).await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failures.iter().all(|f| f.source_kind == SourceKind::Local));
    }
}
