// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapters.
//!
//! [`OpenAiGenerator`] implements [`GeneratorAdapter`] over
//! `/chat/completions` and [`OpenAiEmbedder`] implements [`EmbeddingAdapter`]
//! over `/embeddings`. Any server speaking the same protocol (vLLM, Ollama,
//! LM Studio) works by changing `provider.base_url`.

pub mod client;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use aiko_config::model::ProviderConfig;
use aiko_core::traits::{EmbeddingAdapter, GeneratorAdapter, PluginAdapter};
use aiko_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, GenerationRequest, GenerationResponse,
    HealthStatus, Role,
};
use aiko_core::AikoError;

use crate::client::OpenAiClient;
use crate::types::{ApiMessage, ChatCompletionRequest, EmbeddingRequest, ResponseFormat};

/// Build a shared client from configuration, reading `OPENAI_API_KEY` when no
/// key is configured.
pub fn client_from_config(config: &ProviderConfig) -> Result<Arc<OpenAiClient>, AikoError> {
    let env_key = std::env::var("OPENAI_API_KEY").ok();
    let api_key = config.api_key.as_deref().or(env_key.as_deref());
    let client = OpenAiClient::new(
        &config.base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(Arc::new(client))
}

/// Chat-completions text generator.
pub struct OpenAiGenerator {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn to_api_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ApiMessage {
                role: Role::System.to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ApiMessage {
            role: m.role.to_string(),
            content: m.content.clone(),
        }));

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_mode.then(ResponseFormat::json_object),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        // No request is made; a probe would spend tokens.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl GeneratorAdapter for OpenAiGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, AikoError> {
        let api_request = self.to_api_request(&request);
        let response = self.client.chat_completion(&api_request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AikoError::provider("completion response contained no choices"))?;
        debug!(model = %response.model, chars = text.len(), "completion received");

        Ok(GenerationResponse {
            text,
            model: if response.model.is_empty() {
                self.model.clone()
            } else {
                response.model
            },
        })
    }
}

/// `/embeddings` adapter.
pub struct OpenAiEmbedder {
    client: Arc<OpenAiClient>,
    model: String,
    dimensions: usize,
    /// Sent to the API only when explicitly configured.
    requested_dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    /// `dimensions` overrides the model's native size when the model supports it.
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>, dimensions: Option<usize>) -> Self {
        let model = model.into();
        Self {
            dimensions: dimensions.unwrap_or_else(|| native_dimensions(&model)),
            requested_dimensions: dimensions,
            client,
            model,
        }
    }
}

/// Native output size of well-known embedding models.
fn native_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "nomic-embed-text" => 768,
        "all-minilm" => 384,
        _ => 1536,
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embeddings"
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
impl EmbeddingAdapter for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, AikoError> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: input.text,
            dimensions: self.requested_dimensions,
        };
        let response = self.client.embeddings(&request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AikoError::provider("embedding response contained no data"))?;

        if embedding.len() != self.dimensions {
            return Err(AikoError::provider(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(EmbeddingOutput { embedding })
    }
}
