// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock web search provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use aiko_core::traits::{PluginAdapter, WebSearchAdapter};
use aiko_core::types::{AdapterType, HealthStatus, WebSearchHit, WebSearchRequest};
use aiko_core::AikoError;

enum Behavior {
    Hits(Vec<WebSearchHit>),
    Fail,
    Hang(Duration),
}

pub struct MockSearch {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl MockSearch {
    /// Returns the given hits (up to the request limit) for every query.
    pub fn with_hits(hits: Vec<WebSearchHit>) -> Self {
        Self {
            behavior: Behavior::Hits(hits),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_hits(Vec::new())
    }

    /// Every call fails with a provider error.
    pub fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps for `delay` before answering with nothing.
    pub fn hanging(delay: Duration) -> Self {
        Self {
            behavior: Behavior::Hang(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Convenience constructor for a search hit.
pub fn hit(title: &str, snippet: &str, url: &str) -> WebSearchHit {
    WebSearchHit {
        title: title.to_string(),
        snippet: snippet.to_string(),
        url: url.to_string(),
    }
}

#[async_trait]
impl PluginAdapter for MockSearch {
    fn name(&self) -> &str {
        "mock-search"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::WebSearch
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        Ok(match self.behavior {
            Behavior::Fail => HealthStatus::Unhealthy("mock search is failing".into()),
            _ => HealthStatus::Healthy,
        })
    }
}

#[async_trait]
impl WebSearchAdapter for MockSearch {
    async fn search(&self, request: WebSearchRequest) -> Result<Vec<WebSearchHit>, AikoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Hits(hits) => Ok(hits.iter().take(request.limit).cloned().collect()),
            Behavior::Fail => Err(AikoError::provider("mock search unavailable")),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }
}
