// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inner-monologue evaluation of an incoming message.
//!
//! The evaluator decides how strongly a reply is expected, which retrieval
//! queries would help answer, and which facts are worth remembering. The
//! LLM-backed implementation asks the generation service for a JSON object
//! and degrades to an empty evaluation when the service fails or the output
//! cannot be parsed.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use aiko_config::model::{EvaluatorConfig, PipelineConfig};
use aiko_core::types::{ChatMessage, GenerationRequest, Role};
use aiko_core::{
    Character, Conversation, Digest, GeneratorAdapter, MemoryDraft, Message, Query, QueryKind,
    SenderRef, TimeRelevance,
};
use aiko_resilience::with_timeout;

/// Default truthfulness for extracted facts when the model gives none.
const DEFAULT_TRUTHFULNESS: f32 = 0.6;

const EVALUATION_FORMAT: &str = r#"Before answering, think about the newest message and respond with a single JSON object:

{
  "thoughts": "your private reasoning about the message",
  "reply_expectation": 0.0 to 1.0, how much a reply is expected from you,
  "queries": [
    {"query": "search text", "topic": "short topic", "type": "PERSONAL|NEWS|RESEARCH|OTHER", "time_relevance": "NOW|WEEK|MONTH|YEAR|ALWAYS"}
  ],
  "memories": [
    {"memory": "standalone fact worth remembering", "person": "who it is about", "topic": "short topic", "truthfulness": 0.0 to 1.0}
  ]
}

Use PERSONAL for facts about the user or your relationship; those are answered from memory only.
Only add queries for information you are missing. Only add memories for new facts stated in the conversation.
Output JSON only."#;

const FOLLOW_UP_FORMAT: &str = r#"You searched for information to answer the newest message. Below is what was found.
If something important is still missing, respond with new queries that are different from the ones already asked.
If nothing is missing, respond with an empty list.

Respond with a single JSON object:
{"queries": [{"query": "search text", "type": "PERSONAL|NEWS|RESEARCH|OTHER", "time_relevance": "NOW|WEEK|MONTH|YEAR|ALWAYS"}]}
Output JSON only."#;

/// Result of evaluating one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// How strongly a reply is expected, in `[0, 1]`.
    pub reply_expectation: f32,
    /// Deduplicated retrieval queries, at depth 0.
    pub queries: Vec<Query>,
    pub candidate_memories: Vec<MemoryDraft>,
    pub thoughts: String,
}

impl Evaluation {
    pub fn empty(reply_expectation: f32) -> Self {
        Self {
            reply_expectation,
            queries: Vec::new(),
            candidate_memories: Vec::new(),
            thoughts: String::new(),
        }
    }
}

/// Plans retrieval and memory extraction for a message.
///
/// Implementations never fail: an unavailable or confused backend yields an
/// empty evaluation.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, conversation: &Conversation, new_message: &Message) -> Evaluation;

    /// Queries for a further retrieval round given what `digest` already
    /// covers. `depth` is the iteration the queries will run in.
    async fn follow_up(
        &self,
        conversation: &Conversation,
        new_message: &Message,
        digest: &Digest,
        depth: u32,
    ) -> Vec<Query>;
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub max_queries: usize,
    pub history_messages: usize,
    pub default_reply_expectation: f32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl EvaluatorSettings {
    pub fn from_config(evaluator: &EvaluatorConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            max_queries: evaluator.max_queries,
            history_messages: evaluator.history_messages,
            default_reply_expectation: evaluator.default_reply_expectation,
            max_tokens: evaluator.max_tokens,
            temperature: evaluator.temperature,
            timeout: Duration::from_millis(pipeline.generation_timeout_ms),
        }
    }
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self::from_config(&EvaluatorConfig::default(), &PipelineConfig::default())
    }
}

/// Evaluator backed by the generation service in JSON mode.
pub struct LlmEvaluator {
    generator: Arc<dyn GeneratorAdapter>,
    character: Character,
    settings: EvaluatorSettings,
}

impl LlmEvaluator {
    pub fn new(
        generator: Arc<dyn GeneratorAdapter>,
        character: Character,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            generator,
            character,
            settings,
        }
    }

    async fn ask(&self, system: String, user_prompt: String) -> Option<String> {
        let request = GenerationRequest {
            system: Some(system),
            messages: vec![ChatMessage::new(Role::User, user_prompt)],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            json_mode: true,
        };
        match with_timeout(self.settings.timeout, self.generator.generate(request)).await {
            Ok(response) => Some(response.text),
            Err(err) => {
                warn!(error = %err, "evaluation request failed");
                None
            }
        }
    }

    fn transcript(&self, conversation: &Conversation, new_message: &Message) -> String {
        let mut history = conversation.last_messages(self.settings.history_messages);
        if history.last() == Some(new_message) {
            history = &history[..history.len() - 1];
        }

        let mut out = String::new();
        if !history.is_empty() {
            out.push_str("Conversation so far:\n");
            for message in history {
                out.push_str(&format!("{}: {}\n", self.speaker(message), message.text));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "Newest message:\n{}: {}\n",
            self.speaker(new_message),
            new_message.text
        ));
        out
    }

    fn speaker(&self, message: &Message) -> String {
        match &message.sender {
            SenderRef::User(id) => format!("User ({id})"),
            SenderRef::Character(_) => self.character.display_name.clone(),
        }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, conversation: &Conversation, new_message: &Message) -> Evaluation {
        let system = format!("{}\n\n{EVALUATION_FORMAT}", self.character.eval_instruction());
        let raw = self.ask(system, self.transcript(conversation, new_message)).await;

        let mut evaluation = match raw.as_deref().and_then(parse_raw_evaluation) {
            Some(parsed) => {
                into_evaluation(parsed, self.settings.default_reply_expectation, self.settings.max_queries)
            }
            None => {
                if raw.is_some() {
                    warn!("evaluation output could not be parsed, using empty evaluation");
                }
                Evaluation::empty(self.settings.default_reply_expectation)
            }
        };

        if let Some(fact) = strip_remember_prefix(&new_message.text) {
            add_explicit_memory(&mut evaluation.candidate_memories, fact);
        }

        debug!(
            reply_expectation = evaluation.reply_expectation,
            queries = evaluation.queries.len(),
            memories = evaluation.candidate_memories.len(),
            "message evaluated"
        );
        evaluation
    }

    async fn follow_up(
        &self,
        conversation: &Conversation,
        new_message: &Message,
        digest: &Digest,
        depth: u32,
    ) -> Vec<Query> {
        let system = format!("{}\n\n{FOLLOW_UP_FORMAT}", self.character.eval_instruction());
        let mut prompt = self.transcript(conversation, new_message);
        prompt.push_str("\nFound so far");
        if digest.is_empty() {
            prompt.push_str(": nothing.\n");
        } else {
            prompt.push_str(&format!(
                " (confidence {:.2}):\n{}\n\nAlready asked:\n",
                digest.overall_confidence, digest.overall_summary
            ));
            let mut asked: Vec<&str> = digest.items.iter().map(|i| i.origin_query.text.as_str()).collect();
            asked.sort_unstable();
            asked.dedup();
            for query in asked {
                prompt.push_str(&format!("- {query}\n"));
            }
        }

        let Some(raw) = self.ask(system, prompt).await else {
            return Vec::new();
        };
        match parse_raw_evaluation(&raw) {
            Some(parsed) => queries_from(parsed.queries, depth, self.settings.max_queries),
            None => {
                warn!(depth, "follow-up output could not be parsed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawEvaluation {
    #[serde(default)]
    thoughts: String,
    #[serde(default)]
    reply_expectation: Option<f32>,
    #[serde(default)]
    queries: Vec<RawQueryEntry>,
    #[serde(default)]
    memories: Vec<RawMemoryEntry>,
}

/// Models sometimes answer with bare strings instead of objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQueryEntry {
    Text(String),
    Full(RawQuery),
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    #[serde(default)]
    query: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    time_relevance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMemoryEntry {
    Text(String),
    Full(RawMemory),
}

#[derive(Debug, Deserialize)]
struct RawMemory {
    #[serde(default)]
    memory: String,
    #[serde(default)]
    truthfulness: Option<f32>,
}

/// Slice out the outermost JSON object, tolerating code fences and prose.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn parse_raw_evaluation(raw: &str) -> Option<RawEvaluation> {
    let json = extract_json_object(raw.trim())?;
    match serde_json::from_str::<RawEvaluation>(json) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(error = %e, raw, "malformed evaluation output");
            None
        }
    }
}

fn into_evaluation(raw: RawEvaluation, default_expectation: f32, max_queries: usize) -> Evaluation {
    let reply_expectation = match raw.reply_expectation {
        Some(value) if value.is_finite() => value.clamp(0.0, 1.0),
        _ => default_expectation,
    };

    let mut seen = HashSet::new();
    let candidate_memories = raw
        .memories
        .into_iter()
        .filter_map(|entry| {
            let (text, truthfulness) = match entry {
                RawMemoryEntry::Text(text) => (text, None),
                RawMemoryEntry::Full(m) => (m.memory, m.truthfulness),
            };
            let text = text.trim().to_string();
            if text.is_empty() || !seen.insert(aiko_core::retrieval::normalize_text(&text)) {
                return None;
            }
            let hint = truthfulness.filter(|t| t.is_finite()).unwrap_or(DEFAULT_TRUTHFULNESS);
            Some(MemoryDraft::extracted(text, hint))
        })
        .collect();

    Evaluation {
        reply_expectation,
        queries: queries_from(raw.queries, 0, max_queries),
        candidate_memories,
        thoughts: raw.thoughts.trim().to_string(),
    }
}

/// Drop blank and duplicate queries and keep at most `max_queries`.
fn queries_from(entries: Vec<RawQueryEntry>, depth: u32, max_queries: usize) -> Vec<Query> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|entry| {
            let raw = match entry {
                RawQueryEntry::Text(query) => RawQuery {
                    query,
                    kind: None,
                    time_relevance: None,
                },
                RawQueryEntry::Full(raw) => raw,
            };
            let text = raw.query.trim();
            if text.is_empty() {
                return None;
            }
            let kind = raw
                .kind
                .as_deref()
                .and_then(|k| QueryKind::from_str(k.trim()).ok())
                .unwrap_or_default();
            let time_relevance = raw
                .time_relevance
                .as_deref()
                .and_then(|t| TimeRelevance::from_str(t.trim()).ok())
                .unwrap_or_default();
            Some(
                Query::new(text, depth)
                    .with_kind(kind)
                    .with_time_relevance(time_relevance),
            )
        })
        .filter(|q| seen.insert(q.dedup_key()))
        .take(max_queries)
        .collect()
}

/// The fact after a leading "remember ..." instruction, if there is one.
pub fn strip_remember_prefix(text: &str) -> Option<&str> {
    const PREFIXES: [&str; 5] = [
        "remember this:",
        "remember that:",
        "remember:",
        "remember this ",
        "remember that ",
    ];
    let trimmed = text.trim_start();
    let lower = trimmed.to_lowercase();
    PREFIXES
        .iter()
        .find(|prefix| lower.starts_with(*prefix))
        .and_then(|prefix| trimmed.get(prefix.len()..))
        .map(str::trim)
        .filter(|fact| !fact.is_empty())
}

fn add_explicit_memory(drafts: &mut Vec<MemoryDraft>, fact: &str) {
    let key = aiko_core::retrieval::normalize_text(fact);
    drafts.retain(|d| aiko_core::retrieval::normalize_text(&d.text) != key);
    drafts.insert(0, MemoryDraft::explicit(fact));
}
