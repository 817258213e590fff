//! Metadata store: ingestion records keyed by file path.
//!
//! One record exists per successfully ingested file version. Records are
//! never mutated; re-ingesting a path flags the current record superseded
//! and inserts a new one, keeping the version history intact.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// Bookkeeping for one ingested file version.
#[derive(Debug, Clone)]
pub struct IngestionRecord {
    pub path: String,
    pub fingerprint: String,
    pub format: String,
    pub ingested_at: i64,
    pub chunk_count: i64,
}

/// Fetch the current (non-superseded) record for a path, if any.
pub async fn get_current(pool: &SqlitePool, path: &str) -> Result<Option<IngestionRecord>> {
    let row = sqlx::query(
        r#"
        SELECT path, fingerprint, format, ingested_at, chunk_count
        FROM ingestion_records
        WHERE path = ? AND superseded_at IS NULL
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(path)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| IngestionRecord {
        path: row.get("path"),
        fingerprint: row.get("fingerprint"),
        format: row.get("format"),
        ingested_at: row.get("ingested_at"),
        chunk_count: row.get("chunk_count"),
    }))
}

/// Record a newly ingested file version, superseding any current record
/// for the same path. Both writes happen in one transaction.
pub async fn put(pool: &SqlitePool, record: &IngestionRecord) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE ingestion_records SET superseded_at = ? WHERE path = ? AND superseded_at IS NULL",
    )
    .bind(now)
    .bind(&record.path)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO ingestion_records (path, fingerprint, format, ingested_at, chunk_count)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.path)
    .bind(&record.fingerprint)
    .bind(&record.format)
    .bind(record.ingested_at)
    .bind(record.chunk_count)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Number of current (non-superseded) records.
pub async fn count_current(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ingestion_records WHERE superseded_at IS NULL")
            .fetch_one(pool)
            .await?;
    Ok(count)
}
