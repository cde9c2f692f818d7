// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Aiko.
//!
//! Mock adapters that need no network and behave deterministically:
//!
//! - [`MockEmbedder`] - bag-of-words hashing embedder with failure injection
//! - [`MockGenerator`] - queued evaluator and reply responses
//! - [`MockSearch`] - static, failing or slow web search

pub mod mock_embedder;
pub mod mock_generator;
pub mod mock_search;

pub use mock_embedder::MockEmbedder;
pub use mock_generator::MockGenerator;
pub use mock_search::{MockSearch, hit};
