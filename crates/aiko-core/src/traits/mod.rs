// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod embedding;
pub mod generator;
pub mod refiner;
pub mod search;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use generator::GeneratorAdapter;
pub use refiner::RefinerAdapter;
pub use search::WebSearchAdapter;
