// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock generation service with separate queues for evaluations and replies.
//!
//! Requests with `json_mode` set are evaluator calls and are answered from the
//! evaluation queue; all others are answered from the reply queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use aiko_core::traits::{GeneratorAdapter, PluginAdapter};
use aiko_core::types::{AdapterType, GenerationRequest, GenerationResponse, HealthStatus};
use aiko_core::AikoError;

const EMPTY_EVALUATION: &str = r#"{"thoughts":"","reply_expectation":1.0,"queries":[],"memories":[]}"#;

#[derive(Default)]
pub struct MockGenerator {
    evaluations: Arc<Mutex<VecDeque<String>>>,
    replies: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    fail_replies: AtomicBool,
    reply_delay: Mutex<Option<Duration>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw evaluator response (usually JSON).
    pub async fn push_evaluation(&self, raw: impl Into<String>) {
        self.evaluations.lock().await.push_back(raw.into());
    }

    /// Queue an evaluator response built from a JSON value.
    pub async fn push_evaluation_json(&self, value: serde_json::Value) {
        self.push_evaluation(value.to_string()).await;
    }

    pub async fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(text.into());
    }

    /// Make every reply (non-JSON) request fail with a provider error.
    pub fn fail_replies(&self, fail: bool) {
        self.fail_replies.store(fail, Ordering::SeqCst);
    }

    /// Delay reply requests, for timeout tests.
    pub async fn delay_replies(&self, delay: Duration) {
        *self.reply_delay.lock().await = Some(delay);
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn evaluation_requests(&self) -> usize {
        self.requests.lock().await.iter().filter(|r| r.json_mode).count()
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl GeneratorAdapter for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, AikoError> {
        let json_mode = request.json_mode;
        self.requests.lock().await.push(request);

        let text = if json_mode {
            self.evaluations
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| EMPTY_EVALUATION.to_string())
        } else {
            let delay = *self.reply_delay.lock().await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_replies.load(Ordering::SeqCst) {
                return Err(AikoError::provider("mock generator unavailable"));
            }
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| "mock reply".to_string())
        };

        Ok(GenerationResponse {
            text,
            model: "mock".to_string(),
        })
    }
}
