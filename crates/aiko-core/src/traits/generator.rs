// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generator adapter trait for the text-generation service.

use async_trait::async_trait;

use crate::error::AikoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{GenerationRequest, GenerationResponse};

/// Adapter for the downstream language model.
///
/// Used both to produce the final reply and for the evaluator's
/// inner-monologue step.
#[async_trait]
pub trait GeneratorAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, AikoError>;
}
