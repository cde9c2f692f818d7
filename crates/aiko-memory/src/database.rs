// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the vector memory store.
//!
//! The store serves reads and writes from memory; this module only loads the
//! full table at startup and writes dirty snapshots on `save`. All statements
//! run on tokio-rusqlite's single background thread.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use aiko_core::{AikoError, CharacterId, MemoryId, MemorySource, UserId};

use crate::types::{Memory, blob_to_vec, vec_to_blob};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

fn storage_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> AikoError {
    AikoError::Storage {
        source: Box::new(e),
    }
}

/// Apply pending schema migrations on a synchronous connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), AikoError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| AikoError::Storage {
            source: Box::new(e),
        })?;
    Ok(())
}

/// Handle to the on-disk memory table.
pub struct MemoryDatabase {
    conn: Connection,
}

impl MemoryDatabase {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: &Path) -> Result<Self, AikoError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| AikoError::Storage {
                source: Box::new(e),
            })?;
        }

        let migrate_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), AikoError> {
            let mut conn = rusqlite::Connection::open(&migrate_path).map_err(|e| {
                AikoError::Storage {
                    source: Box::new(e),
                }
            })?;
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
                .map_err(|e| AikoError::Storage {
                    source: Box::new(e),
                })?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| AikoError::Internal(format!("migration task failed: {e}")))??;

        let conn = Connection::open(path).await.map_err(|e| AikoError::Storage {
            source: Box::new(e),
        })?;
        info!(path = %path.display(), "memory database opened");
        Ok(Self { conn })
    }

    /// Read every persisted memory.
    pub async fn load_all(&self) -> Result<Vec<Memory>, AikoError> {
        self.conn
            .call(|conn| -> Result<Vec<Memory>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, character_id, text, embedding, source, relevance_hint, created_at, last_accessed_at FROM memories ORDER BY created_at, id",
                )?;
                let memories = stmt
                    .query_map([], row_to_memory)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(memories)
            })
            .await
            .map_err(storage_err)
    }

    /// Upsert `memories` and delete `deleted` in one transaction.
    ///
    /// Content columns are written on first insert only; later upserts refresh
    /// `last_accessed_at`.
    pub async fn write_snapshot(
        &self,
        memories: Vec<Memory>,
        deleted: Vec<MemoryId>,
    ) -> Result<(), AikoError> {
        let upserts = memories.len();
        let deletes = deleted.len();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut upsert = tx.prepare(
                        "INSERT INTO memories (id, user_id, character_id, text, embedding, source, relevance_hint, created_at, last_accessed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(id) DO UPDATE SET last_accessed_at = excluded.last_accessed_at",
                    )?;
                    for memory in &memories {
                        upsert.execute(rusqlite::params![
                            memory.id.as_str(),
                            memory.owner_user_id.0,
                            memory.owner_character_id.0,
                            memory.text,
                            vec_to_blob(&memory.embedding),
                            memory.source.to_string(),
                            f64::from(memory.relevance_hint),
                            memory.created_at.to_rfc3339(),
                            memory.last_accessed_at.to_rfc3339(),
                        ])?;
                    }
                    let mut delete = tx.prepare("DELETE FROM memories WHERE id = ?1")?;
                    for id in &deleted {
                        delete.execute(rusqlite::params![id.as_str()])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(storage_err)?;
        debug!(upserts, deletes, "memory snapshot written");
        Ok(())
    }
}

fn parse_timestamp(idx: usize, value: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> Result<Memory, rusqlite::Error> {
    let blob: Vec<u8> = row.get(4)?;
    let source: String = row.get(5)?;
    let source = source
        .parse::<MemorySource>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let relevance_hint: f64 = row.get(6)?;

    Ok(Memory {
        id: MemoryId(row.get(0)?),
        owner_user_id: UserId(row.get(1)?),
        owner_character_id: CharacterId(row.get(2)?),
        text: row.get(3)?,
        embedding: blob_to_vec(&blob),
        source,
        relevance_hint: relevance_hint as f32,
        created_at: parse_timestamp(7, row.get(7)?)?,
        last_accessed_at: parse_timestamp(8, row.get(8)?)?,
    })
}
