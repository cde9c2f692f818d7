// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns evaluator memory drafts into committed memories.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use aiko_core::types::EmbeddingInput;
use aiko_core::{AikoError, EmbeddingAdapter, MemoryDraft, MemoryId, Scope};
use aiko_resilience::{RetryPolicy, with_timeout};

use crate::store::VectorMemoryStore;
use crate::types::Memory;

/// Embeds drafts and appends them to the vector store.
///
/// Commits are append-only: no deduplication, contradiction checks or
/// updates of existing memories.
pub struct MemoryLifecycleManager {
    store: Arc<VectorMemoryStore>,
    embedder: Arc<dyn EmbeddingAdapter>,
    retry: RetryPolicy,
    embed_timeout: Duration,
}

impl MemoryLifecycleManager {
    pub fn new(
        store: Arc<VectorMemoryStore>,
        embedder: Arc<dyn EmbeddingAdapter>,
        retry: RetryPolicy,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            retry,
            embed_timeout,
        }
    }

    pub fn store(&self) -> &Arc<VectorMemoryStore> {
        &self.store
    }

    /// Commit `drafts` under `scope` and return the ids of stored memories.
    ///
    /// A draft whose embedding still fails after retries is skipped. A store
    /// failure stops the commit; memories inserted before it are kept.
    pub async fn commit(
        &self,
        drafts: Vec<MemoryDraft>,
        scope: &Scope,
    ) -> Result<Vec<MemoryId>, AikoError> {
        let mut committed = Vec::with_capacity(drafts.len());
        let mut skipped = 0usize;

        for draft in drafts {
            let text = draft.text.trim();
            if text.is_empty() {
                skipped += 1;
                continue;
            }

            let embedding = match self.embed(text).await {
                Ok(embedding) => embedding,
                Err(err) => {
                    warn!(scope = %scope, error = %err, "dropping memory draft, embedding failed");
                    skipped += 1;
                    continue;
                }
            };

            let memory = Memory::new(scope, text, embedding, draft.source, draft.relevance_hint);
            let id = self.store.insert(memory)?;
            debug!(scope = %scope, memory_id = %id, source = %draft.source, "memory committed");
            committed.push(id);
        }

        if !committed.is_empty() || skipped > 0 {
            info!(scope = %scope, committed = committed.len(), skipped, "memory commit finished");
        }
        Ok(committed)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AikoError> {
        let output = self
            .retry
            .run("embed_memory", || {
                with_timeout(
                    self.embed_timeout,
                    self.embedder.embed(EmbeddingInput::new(text)),
                )
            })
            .await?;
        Ok(output.embedding)
    }
}

#[cfg(test)]
mod tests {
    use aiko_core::MemorySource;
    use aiko_test_utils::MockEmbedder;

    use super::*;

    fn manager(embedder: Arc<MockEmbedder>, store: Arc<VectorMemoryStore>) -> MemoryLifecycleManager {
        MemoryLifecycleManager::new(
            store,
            embedder,
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn commits_every_draft_in_scope() {
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        let embedder = Arc::new(MockEmbedder::new());
        let scope = Scope::new("u1", "aiko");

        let ids = manager(embedder, store.clone())
            .commit(
                vec![
                    MemoryDraft::extracted("User has a dog named Rex", 0.7),
                    MemoryDraft::explicit("User's birthday is in May"),
                ],
                &scope,
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(store.len(&scope), 2);
        let explicit = store.get(&scope, &ids[1]).unwrap();
        assert_eq!(explicit.source, MemorySource::Explicit);
        assert!((explicit.relevance_hint - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn duplicates_are_not_merged() {
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        let scope = Scope::new("u1", "aiko");
        let manager = manager(Arc::new(MockEmbedder::new()), store.clone());

        let draft = MemoryDraft::extracted("likes jazz", 0.6);
        manager.commit(vec![draft.clone()], &scope).await.unwrap();
        manager.commit(vec![draft], &scope).await.unwrap();
        assert_eq!(store.len(&scope), 2);
    }

    #[tokio::test]
    async fn transient_embedding_failure_is_retried() {
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        let embedder = Arc::new(MockEmbedder::new());
        embedder.fail_next(2);
        let scope = Scope::new("u1", "aiko");

        let ids = manager(embedder.clone(), store)
            .commit(vec![MemoryDraft::extracted("plays chess", 0.6)], &scope)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_embedding_failure_skips_draft() {
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        let scope = Scope::new("u1", "aiko");

        let ids = manager(Arc::new(MockEmbedder::failing()), store.clone())
            .commit(vec![MemoryDraft::extracted("plays chess", 0.6)], &scope)
            .await
            .unwrap();
        assert!(ids.is_empty());
        assert!(store.is_empty(&scope));
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        // The store expects 3 dimensions; the mock embedder produces 256.
        let store = Arc::new(VectorMemoryStore::in_memory(Some(3)));
        let scope = Scope::new("u1", "aiko");
        let result = manager(Arc::new(MockEmbedder::new()), store.clone())
            .commit(vec![MemoryDraft::extracted("a fact", 0.6)], &scope)
            .await;
        assert!(matches!(result, Err(AikoError::Storage { .. })));
        assert!(store.is_empty(&scope));
    }

    #[tokio::test]
    async fn blank_drafts_are_ignored() {
        let store = Arc::new(VectorMemoryStore::in_memory(None));
        let embedder = Arc::new(MockEmbedder::new());
        let scope = Scope::new("u1", "aiko");
        let ids = manager(embedder.clone(), store)
            .commit(vec![MemoryDraft::extracted("   ", 0.6)], &scope)
            .await
            .unwrap();
        assert!(ids.is_empty());
        assert_eq!(embedder.calls(), 0);
    }
}
