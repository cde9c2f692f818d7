// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scope-sharded vector memory store.
//!
//! Memories live in memory, one shard per (user, character) scope, so writes
//! in one scope never wait on another. Each shard tracks which records changed
//! since the last save; `save` snapshots those changes and writes them to
//! SQLite without holding any shard lock across the write.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use aiko_config::model::StorageConfig;
use aiko_core::{AikoError, MemoryId, Scope};

use crate::database::MemoryDatabase;
use crate::types::{Memory, ScoredMemory, cosine_similarity, normalize};

#[derive(Debug, Default)]
struct ScopeShard {
    memories: Vec<Memory>,
    /// Inserted or touched since the last save.
    pending: HashSet<MemoryId>,
    /// Deleted since the last save.
    deleted: Vec<MemoryId>,
}

/// Outcome of a [`VectorMemoryStore::save`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub scopes: usize,
    pub upserts: usize,
    pub deletes: usize,
}

/// In-memory vector store with optional SQLite persistence.
pub struct VectorMemoryStore {
    shards: DashMap<Scope, ScopeShard>,
    /// Embedding dimensionality, fixed for the store's lifetime once set.
    dimension: OnceLock<usize>,
    database: Option<MemoryDatabase>,
    save_lock: tokio::sync::Mutex<()>,
}

impl VectorMemoryStore {
    /// A store with no backing file. `save` is a no-op.
    pub fn in_memory(dimension: Option<usize>) -> Self {
        Self::build(dimension, None)
    }

    /// Open the database named in `config` and load every persisted memory.
    pub async fn open(config: &StorageConfig) -> Result<Self, AikoError> {
        Self::open_path(Path::new(&config.database_path), config.embedding_dim).await
    }

    pub async fn open_path(path: &Path, dimension: Option<usize>) -> Result<Self, AikoError> {
        let database = MemoryDatabase::open(path).await?;
        let store = Self::build(dimension, Some(database));
        store.load().await?;
        Ok(store)
    }

    fn build(dimension: Option<usize>, database: Option<MemoryDatabase>) -> Self {
        let lock = OnceLock::new();
        if let Some(dim) = dimension {
            let _ = lock.set(dim);
        }
        Self {
            shards: DashMap::new(),
            dimension: lock,
            database,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The pinned embedding dimensionality, if any memory or config has set it.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn check_dimension(&self, len: usize) -> Result<(), AikoError> {
        if len == 0 {
            return Err(AikoError::storage("embedding must not be empty"));
        }
        let expected = *self.dimension.get_or_init(|| len);
        if expected != len {
            return Err(AikoError::storage(format!(
                "embedding dimension mismatch: expected {expected}, got {len}"
            )));
        }
        Ok(())
    }

    /// Add a memory to its owner's scope.
    pub fn insert(&self, mut memory: Memory) -> Result<MemoryId, AikoError> {
        self.check_dimension(memory.embedding.len())?;
        memory.embedding = normalize(memory.embedding);
        let id = memory.id.clone();
        let scope = memory.scope();

        let mut shard = self.shards.entry(scope.clone()).or_default();
        shard.pending.insert(id.clone());
        shard.memories.push(memory);
        debug!(scope = %scope, memory_id = %id, "memory inserted");
        Ok(id)
    }

    /// Nearest memories of `scope` to `query`, best first.
    ///
    /// Only memories owned by `scope` are considered. Results below
    /// `min_similarity` are dropped. Returned memories get their
    /// `last_accessed_at` refreshed.
    pub fn search(
        &self,
        scope: &Scope,
        query: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredMemory>, AikoError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension()
            && expected != query.len()
        {
            return Err(AikoError::storage(format!(
                "query dimension mismatch: expected {expected}, got {}",
                query.len()
            )));
        }
        let Some(mut shard) = self.shards.get_mut(scope) else {
            return Ok(Vec::new());
        };

        let query = normalize(query.to_vec());
        let ScopeShard {
            memories, pending, ..
        } = &mut *shard;

        let mut ranked: Vec<(usize, f32)> = memories
            .iter()
            .enumerate()
            .map(|(i, m)| (i, cosine_similarity(&m.embedding, &query)))
            .filter(|(_, similarity)| *similarity >= min_similarity)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| memories[a.0].created_at.cmp(&memories[b.0].created_at))
                .then_with(|| memories[a.0].id.cmp(&memories[b.0].id))
        });
        ranked.truncate(top_k);

        let now = Utc::now();
        Ok(ranked
            .into_iter()
            .map(|(i, similarity)| {
                let memory = &mut memories[i];
                memory.last_accessed_at = now;
                pending.insert(memory.id.clone());
                ScoredMemory {
                    memory: memory.clone(),
                    similarity,
                }
            })
            .collect())
    }

    pub fn get(&self, scope: &Scope, id: &MemoryId) -> Option<Memory> {
        self.shards
            .get(scope)
            .and_then(|shard| shard.memories.iter().find(|m| &m.id == id).cloned())
    }

    /// Remove a memory. Returns whether it existed in `scope`.
    pub fn delete(&self, scope: &Scope, id: &MemoryId) -> bool {
        let Some(mut shard) = self.shards.get_mut(scope) else {
            return false;
        };
        let before = shard.memories.len();
        shard.memories.retain(|m| &m.id != id);
        if shard.memories.len() == before {
            return false;
        }
        shard.pending.remove(id);
        shard.deleted.push(id.clone());
        debug!(scope = %scope, memory_id = %id, "memory deleted");
        true
    }

    /// Number of memories in `scope`.
    pub fn len(&self, scope: &Scope) -> usize {
        self.shards.get(scope).map_or(0, |s| s.memories.len())
    }

    pub fn is_empty(&self, scope: &Scope) -> bool {
        self.len(scope) == 0
    }

    /// Number of memories across all scopes.
    pub fn total_len(&self) -> usize {
        self.shards.iter().map(|s| s.memories.len()).sum()
    }

    /// Whether anything changed since the last successful save.
    pub fn has_unsaved_changes(&self) -> bool {
        self.shards
            .iter()
            .any(|s| !s.pending.is_empty() || !s.deleted.is_empty())
    }

    /// Replace the in-memory contents with what is persisted on disk.
    ///
    /// Every row is checked before anything is replaced; a row with a
    /// mismatched dimension fails the load and leaves the store untouched.
    pub async fn load(&self) -> Result<usize, AikoError> {
        let Some(database) = &self.database else {
            return Ok(0);
        };
        let memories = database.load_all().await?;
        let count = memories.len();

        let expected = self
            .dimension()
            .or_else(|| memories.first().map(|m| m.embedding.len()));
        if let Some(expected) = expected {
            if let Some(bad) = memories.iter().find(|m| m.embedding.len() != expected) {
                return Err(AikoError::storage(format!(
                    "persisted memory {} has dimension {}, expected {expected}",
                    bad.id,
                    bad.embedding.len()
                )));
            }
            self.check_dimension(expected)?;
        }

        let mut shards: HashMap<Scope, ScopeShard> = HashMap::new();
        for memory in memories {
            shards.entry(memory.scope()).or_default().memories.push(memory);
        }
        self.shards.clear();
        for (scope, shard) in shards {
            self.shards.insert(scope, shard);
        }
        info!(count, scopes = self.shards.len(), "memories loaded");
        Ok(count)
    }

    /// Persist every change made since the last save.
    ///
    /// Shards are snapshotted one at a time and released before the database
    /// write, so concurrent inserts and searches proceed. Changes made during
    /// the write are picked up by the next save. On failure the snapshot is
    /// marked unsaved again.
    pub async fn save(&self) -> Result<SaveReport, AikoError> {
        let Some(database) = &self.database else {
            return Ok(SaveReport::default());
        };
        let _guard = self.save_lock.lock().await;

        let mut snapshot: Vec<(Scope, HashSet<MemoryId>, Vec<MemoryId>)> = Vec::new();
        let mut upserts = Vec::new();
        for mut shard in self.shards.iter_mut() {
            if shard.pending.is_empty() && shard.deleted.is_empty() {
                continue;
            }
            let pending = std::mem::take(&mut shard.pending);
            let deleted = std::mem::take(&mut shard.deleted);
            upserts.extend(
                shard
                    .memories
                    .iter()
                    .filter(|m| pending.contains(&m.id))
                    .cloned(),
            );
            snapshot.push((shard.key().clone(), pending, deleted));
        }

        let report = SaveReport {
            scopes: snapshot.len(),
            upserts: upserts.len(),
            deletes: snapshot.iter().map(|(_, _, d)| d.len()).sum(),
        };
        if report.scopes == 0 {
            return Ok(report);
        }

        let deletes: Vec<MemoryId> = snapshot.iter().flat_map(|(_, _, d)| d.clone()).collect();
        if let Err(err) = database.write_snapshot(upserts, deletes).await {
            warn!(error = %err, "memory save failed, keeping changes for the next attempt");
            for (scope, pending, deleted) in snapshot {
                let mut shard = self.shards.entry(scope).or_default();
                shard.pending.extend(pending);
                shard.deleted.extend(deleted);
            }
            return Err(err);
        }

        info!(
            scopes = report.scopes,
            upserts = report.upserts,
            deletes = report.deletes,
            "memories saved"
        );
        Ok(report)
    }
}
