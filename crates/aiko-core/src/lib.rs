// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Aiko dialogue pipeline.
//!
//! This crate provides the error type, the domain types passed between
//! pipeline stages, and the adapter traits through which the pipeline talks
//! to embedding, web search, generation and refinement services.

pub mod conversation;
pub mod error;
pub mod retrieval;
pub mod traits;
pub mod types;

pub use conversation::Conversation;
pub use error::AikoError;
pub use retrieval::{
    Digest, DigestItem, MemoryDraft, MemorySource, Query, QueryKind, RetrievedItem,
    SourceFailure, SourceKind, SourceMetadata, TimeRelevance,
};
pub use types::{
    AdapterType, Character, CharacterId, HealthStatus, MemoryId, Message, Scope, SenderRef,
    User, UserId,
};

pub use traits::{
    EmbeddingAdapter, GeneratorAdapter, PluginAdapter, RefinerAdapter, WebSearchAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_display() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Generator,
            AdapterType::Embedding,
            AdapterType::WebSearch,
            AdapterType::Refiner,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _generator(_: &dyn GeneratorAdapter) {}
        fn _embedding(_: &dyn EmbeddingAdapter) {}
        fn _search(_: &dyn WebSearchAdapter) {}
        fn _refiner(_: &dyn RefinerAdapter) {}
    }
}
