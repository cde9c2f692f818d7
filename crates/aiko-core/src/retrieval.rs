// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries, retrieved items, digests and memory drafts passed between pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{MemoryId, TimeFilter};

/// What a query is about. Decides which sources are consulted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryKind {
    /// Facts about the user or the relationship; answered from memory only.
    Personal,
    News,
    Research,
    #[default]
    Other,
}

impl QueryKind {
    pub fn allows_web(self) -> bool {
        !matches!(self, QueryKind::Personal)
    }
}

/// How recent the information behind a query needs to be.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeRelevance {
    Now,
    Week,
    Month,
    Year,
    #[default]
    Always,
}

impl TimeRelevance {
    pub fn time_filter(self) -> Option<TimeFilter> {
        match self {
            TimeRelevance::Now => Some(TimeFilter::Day),
            TimeRelevance::Week => Some(TimeFilter::Week),
            TimeRelevance::Month => Some(TimeFilter::Month),
            TimeRelevance::Year => Some(TimeFilter::Year),
            TimeRelevance::Always => None,
        }
    }
}

/// A retrieval query produced by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Loop iteration that produced the query (0 for the initial evaluation).
    pub origin_depth: u32,
    pub kind: QueryKind,
    pub time_relevance: TimeRelevance,
}

impl Query {
    pub fn new(text: impl Into<String>, origin_depth: u32) -> Self {
        Self {
            text: text.into(),
            origin_depth,
            kind: QueryKind::default(),
            time_relevance: TimeRelevance::default(),
        }
    }

    pub fn with_kind(mut self, kind: QueryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_time_relevance(mut self, time_relevance: TimeRelevance) -> Self {
        self.time_relevance = time_relevance;
        self
    }

    /// Case- and whitespace-insensitive key used to deduplicate queries.
    pub fn dedup_key(&self) -> String {
        normalize_text(&self.text)
    }
}

/// Lowercases and collapses runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where a retrieved item came from. Closed set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Web,
}

/// Source-specific provenance for a retrieved item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceMetadata {
    Memory {
        memory_id: MemoryId,
        created_at: DateTime<Utc>,
    },
    Web {
        url: String,
        title: String,
        rank: usize,
    },
}

/// One piece of supporting information returned by a source.
///
/// `raw_score` is only meaningful within its own source kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub source_kind: SourceKind,
    pub content: String,
    pub raw_score: f32,
    pub origin_query: Query,
    pub source_metadata: SourceMetadata,
}

/// A per-source lookup that failed or timed out and contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source_kind: SourceKind,
    pub query: String,
    pub reason: String,
}

/// A reranked item with its condensed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestItem {
    pub source_kind: SourceKind,
    pub content: String,
    pub short_form: String,
    pub score: f32,
    pub origin_query: Query,
}

/// Ordered, budget-bounded, summarized retrieval result for one loop iteration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Digest {
    pub items: Vec<DigestItem>,
    pub overall_summary: String,
    pub overall_confidence: f32,
}

impl Digest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// How a memory candidate came about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    /// Inferred by the evaluator from the conversation.
    Extracted,
    /// The user asked for it to be remembered.
    Explicit,
}

/// A candidate memory proposed by the evaluator. Carries no embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDraft {
    pub text: String,
    pub source: MemorySource,
    pub relevance_hint: f32,
}

impl MemoryDraft {
    pub fn extracted(text: impl Into<String>, relevance_hint: f32) -> Self {
        Self {
            text: text.into(),
            source: MemorySource::Extracted,
            relevance_hint: relevance_hint.clamp(0.0, 1.0),
        }
    }

    pub fn explicit(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: MemorySource::Explicit,
            relevance_hint: 0.9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn query_kind_parses_case_insensitively() {
        assert_eq!(QueryKind::from_str("personal").unwrap(), QueryKind::Personal);
        assert_eq!(QueryKind::from_str("NEWS").unwrap(), QueryKind::News);
        assert!(QueryKind::from_str("gossip").is_err());
    }

    #[test]
    fn personal_queries_skip_web() {
        assert!(!QueryKind::Personal.allows_web());
        assert!(QueryKind::Research.allows_web());
        assert!(QueryKind::Other.allows_web());
    }

    #[test]
    fn time_relevance_maps_to_filter() {
        assert_eq!(TimeRelevance::Now.time_filter(), Some(TimeFilter::Day));
        assert_eq!(TimeRelevance::Always.time_filter(), None);
    }

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        let a = Query::new("  My   Dog's name ", 0);
        let b = Query::new("my dog's NAME", 1);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn extracted_draft_hint_is_clamped() {
        assert_eq!(MemoryDraft::extracted("x", 1.7).relevance_hint, 1.0);
        assert_eq!(MemoryDraft::explicit("x").source, MemorySource::Explicit);
    }
}
