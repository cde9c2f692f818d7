// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::AikoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Adapter that turns text into fixed-dimension vectors.
///
/// Implementations do not retry; callers wrap them with their own retry and
/// timeout policy. Failures are reported as [`AikoError::Provider`].
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Dimensionality of every vector this adapter returns.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given input.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, AikoError>;
}
