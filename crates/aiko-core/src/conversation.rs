// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only conversation history for one (user, character) pair.

use serde::{Deserialize, Serialize};

use crate::error::AikoError;
use crate::types::Message;

/// Ordered, append-only message history.
///
/// Messages are never edited or removed; `push` is the only mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent `n` messages, oldest first.
    pub fn last_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Returns the suffix of the history that fits the input budget.
    ///
    /// When the history exceeds `max_tokens`, the oldest messages are dropped
    /// until it fits in `max_tokens - cut_off_window`. Cutting a whole window at
    /// once keeps the head of the prompt stable for the following turns.
    /// The newest message is always kept, even when it alone exceeds the
    /// budget. `max_tokens == 0` disables the limit.
    pub fn trimmed(&self, max_tokens: usize, cut_off_window: usize) -> Result<&[Message], AikoError> {
        let mut total = self.estimate_tokens();
        if max_tokens == 0 || total <= max_tokens {
            return Ok(&self.messages);
        }
        if cut_off_window > max_tokens {
            return Err(AikoError::Config(
                "cut_off_window must be less than or equal to max_input_tokens".into(),
            ));
        }
        if max_tokens < 128 {
            return Err(AikoError::Config(
                "max_input_tokens must be at least 128".into(),
            ));
        }

        let target = max_tokens - cut_off_window;
        let mut start = 0;
        let newest = self.messages.len().saturating_sub(1);
        while total > target && start < newest {
            total -= self.messages[start].estimate_tokens();
            start += 1;
        }
        Ok(&self.messages[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn conversation_of(texts: &[&str]) -> Conversation {
        let user = UserId("u1".into());
        let mut conversation = Conversation::new();
        for text in texts {
            conversation.push(Message::from_user(&user, *text));
        }
        conversation
    }

    #[test]
    fn last_messages_returns_tail_in_order() {
        let conversation = conversation_of(&["a", "b", "c"]);
        let tail: Vec<&str> = conversation
            .last_messages(2)
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(tail, vec!["b", "c"]);
        assert_eq!(conversation.last_messages(10).len(), 3);
    }

    #[test]
    fn trimmed_keeps_everything_under_budget() {
        let conversation = conversation_of(&["hello there", "how are you"]);
        assert_eq!(conversation.trimmed(256, 64).unwrap().len(), 2);
        assert_eq!(conversation.trimmed(0, 0).unwrap().len(), 2);
    }

    #[test]
    fn trimmed_cuts_a_whole_window() {
        // Each message is 100 chars = 25 tokens; 8 messages = 200 tokens.
        let long = "x".repeat(100);
        let texts: Vec<&str> = std::iter::repeat_n(long.as_str(), 8).collect();
        let conversation = conversation_of(&texts);

        // Budget 150, window 50: drop down to <= 100 tokens = 4 messages.
        let kept = conversation.trimmed(150, 50).unwrap();
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn trimmed_never_drops_the_newest_message() {
        let huge = "y".repeat(12_000);
        let large = "z".repeat(9_000);
        let conversation = conversation_of(&["hi", huge.as_str(), large.as_str()]);

        let kept = conversation.trimmed(4096, 2048).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, large);
    }

    #[test]
    fn trimmed_rejects_window_larger_than_budget() {
        let long = "x".repeat(1000);
        let conversation = conversation_of(&[long.as_str()]);
        assert!(matches!(
            conversation.trimmed(128, 200),
            Err(AikoError::Config(_))
        ));
        assert!(matches!(
            conversation.trimmed(100, 10),
            Err(AikoError::Config(_))
        ));
    }
}
