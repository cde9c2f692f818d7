// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory for Aiko.
//!
//! Memories are owned by exactly one (user, character) scope and searched by
//! cosine similarity within that scope. The [`VectorMemoryStore`] keeps them
//! in memory and persists changes to SQLite on [`VectorMemoryStore::save`];
//! the [`MemoryLifecycleManager`] embeds evaluator drafts and commits them.

pub mod database;
pub mod lifecycle;
pub mod store;
pub mod types;

pub use lifecycle::MemoryLifecycleManager;
pub use store::{SaveReport, VectorMemoryStore};
pub use types::{Memory, ScoredMemory};
