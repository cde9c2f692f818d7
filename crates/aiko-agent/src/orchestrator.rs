// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn handling for one character.
//!
//! A turn runs: record the message, evaluate it, spawn the memory commit,
//! run the retrieval loop, and, when a reply is expected, generate and refine
//! it. Conversations are kept per (user, character) scope; turns of different
//! users run concurrently, turns of the same user are serialized.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use aiko_config::model::PipelineConfig;
use aiko_core::{
    AikoError, Character, Conversation, Digest, GeneratorAdapter, MemoryId, Message,
    RefinerAdapter, Scope, SenderRef,
};
use aiko_memory::{MemoryLifecycleManager, SaveReport};
use aiko_resilience::with_timeout;

use crate::evaluator::{Evaluation, Evaluator};
use crate::loop_controller::{LoopReport, RetrievalLoop};
use crate::prompt::{self, PromptSettings};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub reply_threshold: f32,
    pub generation_timeout: Duration,
    pub prompt: PromptSettings,
}

impl From<&PipelineConfig> for OrchestratorSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            reply_threshold: config.reply_threshold,
            generation_timeout: Duration::from_millis(config.generation_timeout_ms),
            prompt: PromptSettings::from(config),
        }
    }
}

/// Pending memory commit of a turn.
pub type CommitHandle = JoinHandle<Result<Vec<MemoryId>, AikoError>>;

/// Everything a turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The refined reply, or `None` when no reply was expected.
    pub reply: Option<String>,
    pub evaluation: Evaluation,
    pub report: LoopReport,
    /// Present when the evaluation proposed memories. The commit runs in the
    /// background whether or not this is awaited.
    pub commit: Option<CommitHandle>,
}

impl TurnOutcome {
    pub fn digest(&self) -> &Digest {
        &self.report.digest
    }
}

pub struct Orchestrator {
    character: Character,
    conversations: DashMap<Scope, Arc<Mutex<Conversation>>>,
    evaluator: Arc<dyn Evaluator>,
    retrieval: RetrievalLoop,
    lifecycle: Arc<MemoryLifecycleManager>,
    generator: Arc<dyn GeneratorAdapter>,
    refiner: Arc<dyn RefinerAdapter>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        character: Character,
        evaluator: Arc<dyn Evaluator>,
        retrieval: RetrievalLoop,
        lifecycle: Arc<MemoryLifecycleManager>,
        generator: Arc<dyn GeneratorAdapter>,
        refiner: Arc<dyn RefinerAdapter>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            character,
            conversations: DashMap::new(),
            evaluator,
            retrieval,
            lifecycle,
            generator,
            refiner,
            settings,
        }
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn lifecycle(&self) -> &Arc<MemoryLifecycleManager> {
        &self.lifecycle
    }

    /// Snapshot of the conversation held for `scope`, if any.
    pub async fn conversation(&self, scope: &Scope) -> Option<Conversation> {
        let entry = self.conversations.get(scope).map(|c| c.value().clone())?;
        let conversation = entry.lock().await;
        Some(conversation.clone())
    }

    /// Process one inbound user message.
    ///
    /// Source failures inside evaluation and retrieval degrade silently. A
    /// failed or timed-out generation is returned as [`AikoError::Provider`];
    /// the message stays in the conversation and the memory commit still runs.
    pub async fn handle(&self, message: Message) -> Result<TurnOutcome, AikoError> {
        let user_id = match &message.sender {
            SenderRef::User(user_id) => user_id.clone(),
            SenderRef::Character(id) => {
                return Err(AikoError::Config(format!(
                    "message sender must be a user, got character '{id}'"
                )));
            }
        };
        let scope = Scope {
            user_id,
            character_id: self.character.id.clone(),
        };

        let conversation = self
            .conversations
            .entry(scope.clone())
            .or_default()
            .value()
            .clone();
        let mut conversation = conversation.lock().await;
        conversation.push(message.clone());
        debug!(scope = %scope, messages = conversation.len(), "message received");

        let evaluation = self.evaluator.evaluate(&conversation, &message).await;
        let commit = self.spawn_commit(&evaluation, &scope);

        let report = self
            .retrieval
            .run(&conversation, &message, evaluation.queries.clone(), &scope)
            .await;

        let reply = if evaluation.reply_expectation >= self.settings.reply_threshold {
            let text = self.generate(&conversation, &report.digest).await?;
            let text = match self.refiner.refine(&conversation, text.clone()).await {
                Ok(refined) => refined,
                Err(err) => {
                    warn!(scope = %scope, error = %err, "refiner failed, using unrefined reply");
                    text
                }
            };
            if text.trim().is_empty() {
                warn!(scope = %scope, "generator returned an empty reply");
                None
            } else {
                let mut reply = Message::from_character(&self.character.id, text.clone());
                if !evaluation.thoughts.is_empty() {
                    reply = reply.with_reasoning(evaluation.thoughts.clone());
                }
                conversation.push(reply);
                Some(text)
            }
        } else {
            debug!(
                scope = %scope,
                reply_expectation = evaluation.reply_expectation,
                threshold = self.settings.reply_threshold,
                "no reply expected"
            );
            None
        };

        info!(
            scope = %scope,
            replied = reply.is_some(),
            iterations = report.iterations,
            memories = evaluation.candidate_memories.len(),
            "turn handled"
        );
        Ok(TurnOutcome {
            reply,
            evaluation,
            report,
            commit,
        })
    }

    /// Flush memory changes to disk. Turns in flight are not blocked.
    pub async fn save(&self) -> Result<SaveReport, AikoError> {
        self.lifecycle.store().save().await
    }

    fn spawn_commit(&self, evaluation: &Evaluation, scope: &Scope) -> Option<CommitHandle> {
        if evaluation.candidate_memories.is_empty() {
            return None;
        }
        let lifecycle = Arc::clone(&self.lifecycle);
        let drafts = evaluation.candidate_memories.clone();
        let scope = scope.clone();
        Some(tokio::spawn(async move {
            let result = lifecycle.commit(drafts, &scope).await;
            if let Err(err) = &result {
                tracing::error!(scope = %scope, error = %err, "memory commit failed");
            }
            result
        }))
    }

    async fn generate(&self, conversation: &Conversation, digest: &Digest) -> Result<String, AikoError> {
        let request = prompt::build_request(&self.character, conversation, digest, &self.settings.prompt)?;
        let response = with_timeout(self.settings.generation_timeout, self.generator.generate(request))
            .await
            .map_err(|err| match err {
                AikoError::Timeout { duration } => AikoError::Provider {
                    message: format!("reply generation timed out after {duration:?}"),
                    source: None,
                },
                other => other,
            })?;
        Ok(response.text)
    }
}
