//! Vector index: similarity-searchable chunk storage.
//!
//! Owns chunk persistence exclusively. Vectors are stored as little-endian
//! f32 BLOBs and similarity is computed in-process with cosine, the same
//! way the write path embeds, so no external vector service is needed.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};

/// One chunk headed for the index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// `"{path}:{fingerprint}:{index}"` — stable across re-runs of the
    /// same file version, so interrupted ingestions re-upsert
    /// idempotently. The path prefix keeps ids distinct when two files
    /// carry identical bytes (same fingerprint).
    pub id: String,
    pub path: String,
    pub fingerprint: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub path: String,
    pub chunk_index: i64,
    pub text: String,
}

/// Insert or replace a batch of chunks.
pub async fn upsert_chunks(pool: &SqlitePool, chunks: &[ChunkRecord]) -> Result<()> {
    let mut tx = pool.begin().await?;

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, path, fingerprint, chunk_index, text, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                fingerprint = excluded.fingerprint,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.path)
        .bind(&chunk.fingerprint)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(vec_to_blob(&chunk.embedding))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Remove every chunk belonging to a path. Called before re-ingesting a
/// changed file so stale chunks never survive a content change.
pub async fn delete_by_path(pool: &SqlitePool, path: &str) -> Result<()> {
    sqlx::query("DELETE FROM chunks WHERE path = ?")
        .bind(path)
        .execute(pool)
        .await?;
    Ok(())
}

/// Return the `k` nearest chunks by cosine similarity, descending.
///
/// Ties break by sequence index ascending, then chunk id, so repeated
/// queries over a fixed index state return the same ordering.
pub async fn query(
    pool: &SqlitePool,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<(ChunkHit, f32)>> {
    let rows = sqlx::query("SELECT id, path, chunk_index, text, embedding FROM chunks")
        .fetch_all(pool)
        .await?;

    let mut scored: Vec<(String, ChunkHit, f32)> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(query_vec, &blob_to_vec(&blob));
            let hit = ChunkHit {
                path: row.get("path"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
            };
            (row.get::<String, _>("id"), hit, score)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.chunk_index.cmp(&b.1.chunk_index))
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);

    Ok(scored.into_iter().map(|(_, hit, score)| (hit, score)).collect())
}

/// Total chunks in the index.
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
