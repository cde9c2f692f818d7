// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity, participant and adapter request types shared across the workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a human participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier of a character (persona).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub String);

/// Unique identifier for a stored memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub String);

impl MemoryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (user, character) pair that owns a conversation and its memories.
///
/// Memories written under one scope are never visible to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub user_id: UserId,
    pub character_id: CharacterId,
}

impl Scope {
    pub fn new(user_id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            character_id: CharacterId(character_id.into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.character_id)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of external collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Generator,
    Embedding,
    WebSearch,
    Refiner,
}

/// Role of a message author as seen by the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A human participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            display_name: display_name.into(),
        }
    }
}

/// A persona the pipeline speaks as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub display_name: String,
    /// System instruction describing how the character talks.
    pub personality: String,
    /// Instruction for the inner-monologue evaluation step. Falls back to
    /// `personality` when empty.
    pub eval_instruction: String,
    pub description: String,
}

impl Character {
    pub fn eval_instruction(&self) -> &str {
        if self.eval_instruction.trim().is_empty() {
            &self.personality
        } else {
            &self.eval_instruction
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderRef {
    User(UserId),
    Character(CharacterId),
}

impl SenderRef {
    pub fn role(&self) -> Role {
        match self {
            SenderRef::User(_) => Role::User,
            SenderRef::Character(_) => Role::Assistant,
        }
    }
}

/// A single immutable conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: SenderRef,
    pub timestamp: DateTime<Utc>,
    /// Private reasoning that produced this message, if any. Never sent to the user.
    pub reasoning: Option<String>,
}

impl Message {
    pub fn from_user(user_id: &UserId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: SenderRef::User(user_id.clone()),
            timestamp: Utc::now(),
            reasoning: None,
        }
    }

    pub fn from_character(character_id: &CharacterId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: SenderRef::Character(character_id.clone()),
            timestamp: Utc::now(),
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Rough token estimate of the message text (four characters per token).
    pub fn estimate_tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Estimates the token count of `text` at four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

// --- Generation types ---

/// One chat turn sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A request to the text-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the service for a JSON object response when it supports it.
    #[serde(default)]
    pub json_mode: bool,
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
}

// --- Embedding types ---

/// Input for an embedding adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    pub text: String,
}

impl EmbeddingInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Output from an embedding adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    pub embedding: Vec<f32>,
}

// --- Web search types ---

/// Recency filter passed through to the web search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum TimeFilter {
    Day,
    Week,
    Month,
    Year,
}

/// A web search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSearchRequest {
    pub query: String,
    pub limit: usize,
    pub time_filter: Option<TimeFilter>,
}

/// One ranked web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}
