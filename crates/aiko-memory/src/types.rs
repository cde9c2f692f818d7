// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory records and vector helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aiko_core::{CharacterId, MemoryId, MemorySource, Scope, UserId};

/// A committed long-term memory.
///
/// Text, embedding and owner never change after commit. Only
/// `last_accessed_at` is updated, when the memory is returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub text: String,
    /// Unit-length embedding vector.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub owner_user_id: UserId,
    pub owner_character_id: CharacterId,
    pub source: MemorySource,
    pub relevance_hint: f32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Memory {
    /// Build a fresh memory for `scope` with a new id. The embedding is normalized.
    pub fn new(
        scope: &Scope,
        text: impl Into<String>,
        embedding: Vec<f32>,
        source: MemorySource,
        relevance_hint: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId(uuid::Uuid::new_v4().to_string()),
            text: text.into(),
            embedding: normalize(embedding),
            owner_user_id: scope.user_id.clone(),
            owner_character_id: scope.character_id.clone(),
            source,
            relevance_hint: relevance_hint.clamp(0.0, 1.0),
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn scope(&self) -> Scope {
        Scope {
            user_id: self.owner_user_id.clone(),
            character_id: self.owner_character_id.clone(),
        }
    }
}

/// A memory returned from a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Cosine similarity to the query embedding.
    pub similarity: f32,
}

/// Convert an f32 vector to little-endian bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a little-endian SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter_mut().for_each(|v| *v /= norm);
    }
    vec
}

/// Cosine similarity of two unit-length vectors (their dot product).
///
/// Vectors of different length have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_preserves_values() {
        let original = vec![0.25_f32, -1.5, 3.0, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&original)), original);
    }

    #[test]
    fn new_memory_is_normalized_and_scoped() {
        let scope = Scope::new("u1", "aiko");
        let memory = Memory::new(&scope, "likes tea", vec![3.0, 4.0], MemorySource::Explicit, 0.9);
        assert!((memory.embedding[0] - 0.6).abs() < 1e-6);
        assert!((memory.embedding[1] - 0.8).abs() < 1e-6);
        assert_eq!(memory.scope(), scope);
        assert_eq!(memory.created_at, memory.last_accessed_at);
    }

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let v = normalize(vec![1.0, 2.0, 2.0]);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&v, &[1.0]), 0.0);
    }

    #[test]
    fn zero_vector_stays_zero() {
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
