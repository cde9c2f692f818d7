// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hashing bag-of-words embedder.
//!
//! Texts sharing words get positive cosine similarity; texts with no words in
//! common are orthogonal unless their hashes collide.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use aiko_core::traits::{EmbeddingAdapter, PluginAdapter};
use aiko_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use aiko_core::AikoError;

pub const DEFAULT_DIMENSIONS: usize = 256;

pub struct MockEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
    /// Number of upcoming calls that fail before calls succeed again.
    fail_next: AtomicUsize,
    always_fail: AtomicBool,
    /// Multiplies every returned vector, like services that skip normalization.
    scale: f32,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            always_fail: AtomicBool::new(false),
            scale: 1.0,
        }
    }

    /// An embedder whose vectors have length `factor` instead of 1.
    pub fn scaled(factor: f32) -> Self {
        Self {
            scale: factor,
            ..Self::new()
        }
    }

    /// An embedder whose every call fails with a provider error.
    pub fn failing() -> Self {
        let embedder = Self::new();
        embedder.set_always_fail(true);
        embedder
    }

    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Synchronous embedding, useful for seeding stores in tests.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokens(text) {
            let slot = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, AikoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(AikoError::provider("mock embedder unavailable"));
        }
        let pending = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(AikoError::provider("mock embedder transient failure"));
        }
        let mut embedding = self.vector(&input.text);
        embedding.iter_mut().for_each(|v| *v *= self.scale);
        Ok(EmbeddingOutput { embedding })
    }
}
