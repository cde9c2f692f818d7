// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembly of the reply generation request.

use aiko_config::model::PipelineConfig;
use aiko_core::types::{ChatMessage, GenerationRequest};
use aiko_core::{AikoError, Character, Conversation, Digest};

#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub max_input_tokens: usize,
    pub cut_off_window: usize,
    pub max_generated_tokens: u32,
    pub temperature: f32,
}

impl From<&PipelineConfig> for PromptSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_input_tokens: config.max_input_tokens,
            cut_off_window: config.cut_off_window,
            max_generated_tokens: config.max_generated_tokens,
            temperature: config.temperature,
        }
    }
}

/// The character's system prompt with the digest appended as context.
pub fn system_prompt(character: &Character, digest: &Digest) -> String {
    let mut system = character.personality.trim().to_string();
    if !character.description.trim().is_empty() {
        system.push_str("\n\n");
        system.push_str(character.description.trim());
    }
    if !digest.is_empty() {
        system.push_str("\n\n## Retrieved Context\n");
        system.push_str("Things you remember or looked up. Use them only if they help.\n");
        for item in &digest.items {
            system.push_str(&format!("- ({}) {}\n", item.source_kind, item.content.trim()));
        }
    }
    system
}

/// Build the reply request from the trimmed conversation history.
pub fn build_request(
    character: &Character,
    conversation: &Conversation,
    digest: &Digest,
    settings: &PromptSettings,
) -> Result<GenerationRequest, AikoError> {
    let history = conversation.trimmed(settings.max_input_tokens, settings.cut_off_window)?;
    let messages = history
        .iter()
        .map(|m| ChatMessage::new(m.sender.role(), m.text.clone()))
        .collect();

    Ok(GenerationRequest {
        system: Some(system_prompt(character, digest)),
        messages,
        max_tokens: settings.max_generated_tokens,
        temperature: settings.temperature,
        json_mode: false,
    })
}
