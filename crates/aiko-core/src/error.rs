// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Aiko pipeline.
//!
//! An empty retrieval or evaluation result is never an error. Provider and
//! timeout failures are absorbed per source inside the retriever, evaluator and
//! memory lifecycle; storage and configuration failures are surfaced.

use thiserror::Error;

/// The primary error type used across all Aiko adapter traits and core operations.
#[derive(Debug, Error)]
pub enum AikoError {
    /// Configuration errors (invalid values, missing required settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Vector memory store errors (database, serialization, dimension mismatch).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// External provider errors (embedding, web search, generation).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AikoError {
    /// Builds a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        AikoError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a storage error from a plain message.
    pub fn storage(message: impl Into<String>) -> Self {
        AikoError::Storage {
            source: message.into().into(),
        }
    }

    /// Whether this failure may be absorbed as "no results" for a single source.
    pub fn is_degradable(&self) -> bool {
        matches!(self, AikoError::Provider { .. } | AikoError::Timeout { .. })
    }
}
