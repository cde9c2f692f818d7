// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Refiner adapter trait for post-processing generated replies.

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::error::AikoError;
use crate::traits::adapter::PluginAdapter;

/// Rewrites a generated reply before it is returned to the user.
#[async_trait]
pub trait RefinerAdapter: PluginAdapter {
    async fn refine(&self, conversation: &Conversation, reply: String) -> Result<String, AikoError>;
}
