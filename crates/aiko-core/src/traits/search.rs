// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web search adapter trait.

use async_trait::async_trait;

use crate::error::AikoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{WebSearchHit, WebSearchRequest};

/// Adapter for an external web search provider.
///
/// Returns hits in provider rank order, best first. An empty list is a valid
/// answer, not an error.
#[async_trait]
pub trait WebSearchAdapter: PluginAdapter {
    async fn search(&self, request: WebSearchRequest) -> Result<Vec<WebSearchHit>, AikoError>;
}
