// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! Every section rejects unknown keys and falls back to compiled defaults
//! for keys that are absent.

use std::collections::BTreeMap;

use aiko_core::{Character, CharacterId};
use serde::{Deserialize, Serialize};

/// Top-level Aiko configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AikoConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// The persona this process speaks as.
    #[serde(default)]
    pub character: CharacterConfig,

    /// Vector memory persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retriever fan-out and the retrieval loop bounds.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Reranker budget and scoring strategy.
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Evaluator (inner monologue) settings.
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Orchestrator settings for reply generation.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// OpenAI-compatible generation and embedding service.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Web search service.
    #[serde(default)]
    pub web: WebConfig,

    /// Retry policy for embedding calls.
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Reply style refiner.
    #[serde(default)]
    pub refiner: RefinerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "aiko".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CharacterConfig {
    /// Stable identifier; part of every memory scope.
    #[serde(default = "default_character_id")]
    pub id: String,

    #[serde(default = "default_character_name")]
    pub name: String,

    /// System instruction for reply generation.
    #[serde(default = "default_personality")]
    pub personality: String,

    /// Instruction for the inner-monologue step. Empty means reuse `personality`.
    #[serde(default)]
    pub eval_instruction: String,

    #[serde(default)]
    pub description: String,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            id: default_character_id(),
            name: default_character_name(),
            personality: default_personality(),
            eval_instruction: String::new(),
            description: String::new(),
        }
    }
}

impl CharacterConfig {
    pub fn to_character(&self) -> Character {
        Character {
            id: CharacterId(self.id.clone()),
            display_name: self.name.clone(),
            personality: self.personality.clone(),
            eval_instruction: self.eval_instruction.clone(),
            description: self.description.clone(),
        }
    }
}

fn default_character_id() -> String {
    "aiko".to_string()
}

fn default_character_name() -> String {
    "Aiko".to_string()
}

fn default_personality() -> String {
    "You are Aiko, a warm and curious companion. Keep replies short and conversational, \
     and use what you remember about the user naturally."
        .to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite file holding persisted memories.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Fixed embedding dimensionality. When unset, the first stored memory pins it.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            embedding_dim: None,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("aiko").join("memories.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("memories.db"))
        .to_string_lossy()
        .into_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Nearest memories fetched per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Local hits below this cosine similarity are dropped.
    #[serde(default)]
    pub min_local_similarity: f32,

    #[serde(default = "default_true")]
    pub web_enabled: bool,

    /// Web hits requested per query.
    #[serde(default = "default_web_limit")]
    pub web_limit: usize,

    #[serde(default = "default_local_timeout_ms")]
    pub local_timeout_ms: u64,

    #[serde(default = "default_web_timeout_ms")]
    pub web_timeout_ms: u64,

    /// Follow-up rounds after the first retrieval pass.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Digest confidence at which the loop stops early (0.0-1.0).
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_local_similarity: 0.0,
            web_enabled: true,
            web_limit: default_web_limit(),
            local_timeout_ms: default_local_timeout_ms(),
            web_timeout_ms: default_web_timeout_ms(),
            max_depth: default_max_depth(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_top_k() -> usize {
    5
}

fn default_web_limit() -> usize {
    5
}

fn default_local_timeout_ms() -> u64 {
    2_000
}

fn default_web_timeout_ms() -> u64 {
    8_000
}

fn default_max_depth() -> u32 {
    2
}

fn default_relevance_threshold() -> f32 {
    0.6
}

/// Strategy used to rescore retrieved items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Cosine similarity of embeddings, lexical fallback per item.
    #[default]
    Embedding,
    /// Token-overlap similarity with no external calls.
    Lexical,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RerankConfig {
    /// Digest item budget.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Character cap for each item's short form.
    #[serde(default = "default_short_form_chars")]
    pub short_form_chars: usize,

    #[serde(default)]
    pub scorer: ScorerKind,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            short_form_chars: default_short_form_chars(),
            scorer: ScorerKind::default(),
        }
    }
}

fn default_max_items() -> usize {
    8
}

fn default_short_form_chars() -> usize {
    160
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// Queries kept from one evaluation.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Recent messages shown to the evaluator.
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,

    /// Reply expectation used when the evaluation cannot be parsed.
    #[serde(default = "default_reply_expectation")]
    pub default_reply_expectation: f32,

    #[serde(default = "default_evaluator_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_evaluator_temperature")]
    pub temperature: f32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_queries: default_max_queries(),
            history_messages: default_history_messages(),
            default_reply_expectation: default_reply_expectation(),
            max_tokens: default_evaluator_max_tokens(),
            temperature: default_evaluator_temperature(),
        }
    }
}

fn default_max_queries() -> usize {
    3
}

fn default_history_messages() -> usize {
    10
}

fn default_reply_expectation() -> f32 {
    1.0
}

fn default_evaluator_max_tokens() -> u32 {
    512
}

fn default_evaluator_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Minimum reply expectation for a reply to be generated (0.0-1.0).
    #[serde(default = "default_reply_threshold")]
    pub reply_threshold: f32,

    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    /// History budget in estimated tokens. 0 disables trimming.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,

    /// Tokens cut at once when the history overflows.
    #[serde(default = "default_cut_off_window")]
    pub cut_off_window: usize,

    #[serde(default = "default_max_generated_tokens")]
    pub max_generated_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reply_threshold: default_reply_threshold(),
            generation_timeout_ms: default_generation_timeout_ms(),
            max_input_tokens: default_max_input_tokens(),
            cut_off_window: default_cut_off_window(),
            max_generated_tokens: default_max_generated_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_reply_threshold() -> f32 {
    0.5
}

fn default_generation_timeout_ms() -> u64 {
    30_000
}

fn default_max_input_tokens() -> usize {
    4096
}

fn default_cut_off_window() -> usize {
    2048
}

fn default_max_generated_tokens() -> u32 {
    256
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. Falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebConfig {
    /// JSON search endpoint (SearXNG `format=json` compatible).
    #[serde(default = "default_web_endpoint")]
    pub endpoint: String,

    /// Results whose snippet has fewer words than this are discarded.
    #[serde(default = "default_min_snippet_words")]
    pub min_snippet_words: usize,

    /// Fetch each result page and use its readable text instead of the snippet.
    #[serde(default = "default_true")]
    pub fetch_pages: bool,

    /// Deadline for fetching a single result page.
    #[serde(default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Pages with fewer words of readable text fall back to the snippet.
    #[serde(default = "default_min_page_words")]
    pub min_page_words: usize,

    /// Page text is cut to this many characters.
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            endpoint: default_web_endpoint(),
            min_snippet_words: default_min_snippet_words(),
            fetch_pages: true,
            page_timeout_ms: default_page_timeout_ms(),
            min_page_words: default_min_page_words(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

fn default_web_endpoint() -> String {
    "http://127.0.0.1:8888/search".to_string()
}

fn default_min_snippet_words() -> usize {
    10
}

fn default_page_timeout_ms() -> u64 {
    4_000
}

fn default_min_page_words() -> usize {
    10
}

fn default_max_page_chars() -> usize {
    2_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RefinerConfig {
    /// Chance that each matching word is replaced (0.0 disables the refiner).
    #[serde(default)]
    pub probability: f32,

    /// Word -> replacement, matched case-insensitively on whole words.
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,

    /// Fixed RNG seed for reproducible output.
    #[serde(default)]
    pub seed: Option<u64>,
}
