use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per successfully ingested file version. Rows are never
    // mutated; a re-ingestion flags the old row superseded and inserts
    // a new one.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingestion_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            format TEXT NOT NULL,
            ingested_at INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            superseded_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunk storage with embedding vectors as little-endian f32 BLOBs.
    // Chunk ids are "{path}:{fingerprint}:{index}", so re-upserting after
    // an interrupted run is idempotent and identical files at different
    // paths never collide.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_path ON ingestion_records(path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path)")
        .execute(pool)
        .await?;

    Ok(())
}
