//! Ingestion pipeline orchestration.
//!
//! Drives the full flow per file: read → fingerprint → cache check →
//! stale-chunk invalidation → convert → chunk → embed → upsert vectors →
//! write record. The record is written only after every chunk upsert
//! succeeds, so a crash mid-file leaves a missing record and the file is
//! simply retried on the next run.
//!
//! Files are processed by a bounded worker pool; each file's pipeline runs
//! in sequence within one task. The directory walk yields every path once
//! per run, which is what keeps the single-writer-per-path rule intact —
//! running two ingestions against the same database concurrently is
//! unsupported.
//!
//! Per-file failures (bad content, embedding errors) are captured in the
//! summary and never abort the batch. Store and index failures abort the
//! run: without the cache there is no safe way to continue.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_spans;
use crate::config::Config;
use crate::convert::{self, ConvertError, FileFormat};
use crate::embedding::{embed_with_retry, EmbeddingProvider};
use crate::fingerprint::fingerprint;
use crate::index::{self, ChunkRecord};
use crate::store::{self, IngestionRecord};

/// Why a file was recorded as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Read,
    Conversion,
    Embedding,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Read => write!(f, "read"),
            FailureKind::Conversion => write!(f, "conversion"),
            FailureKind::Embedding => write!(f, "embedding"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome counts for one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestionSummary {
    pub processed: u64,
    pub skipped: u64,
    pub failed: Vec<FailedFile>,
}

enum FileOutcome {
    Processed { chunks: usize },
    SkippedCached,
    SkippedUnsupported,
    Failed(FailedFile),
}

/// Ingest every eligible file under the configured input directory.
///
/// With `dry_run`, files are fingerprinted and cache-checked but nothing
/// is converted, embedded, or written.
pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    limit: Option<usize>,
    dry_run: bool,
) -> Result<IngestionSummary> {
    let mut files = scan_input_dir(config)?;
    if let Some(lim) = limit {
        files.truncate(lim);
    }

    info!(files = files.len(), dry_run, "starting ingestion pass");

    if dry_run {
        return plan_only(pool, &files).await;
    }

    let semaphore = Arc::new(Semaphore::new(config.ingest.workers));
    let mut tasks = JoinSet::new();

    for (abs_path, rel_path) in files {
        let semaphore = semaphore.clone();
        let pool = pool.clone();
        let provider = provider.clone();
        let config = config.clone();

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| anyhow::anyhow!("worker pool closed: {}", e))?;
            ingest_file(&config, &pool, provider.as_ref(), &abs_path, &rel_path).await
        });
    }

    let mut summary = IngestionSummary::default();

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.context("ingestion worker panicked")??;
        match outcome {
            FileOutcome::Processed { chunks } => {
                debug!(chunks, "file processed");
                summary.processed += 1;
            }
            FileOutcome::SkippedCached | FileOutcome::SkippedUnsupported => {
                summary.skipped += 1;
            }
            FileOutcome::Failed(failure) => {
                warn!(path = %failure.path, kind = %failure.kind, "file failed: {}", failure.message);
                summary.failed.push(failure);
            }
        }
    }

    // Deterministic reporting regardless of worker completion order.
    summary.failed.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "ingestion pass complete"
    );

    Ok(summary)
}

/// Process one file end to end. Store/index errors propagate (fatal for
/// the run); content and embedding errors become a `Failed` outcome.
async fn ingest_file(
    config: &Config,
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    abs_path: &Path,
    rel_path: &str,
) -> Result<FileOutcome> {
    let bytes = match tokio::fs::read(abs_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Ok(FileOutcome::Failed(FailedFile {
                path: rel_path.to_string(),
                kind: FailureKind::Read,
                message: e.to_string(),
            }))
        }
    };

    let fp = fingerprint(&bytes);

    // Cache check: same path, same bytes means nothing to do.
    let existing = store::get_current(pool, rel_path).await?;
    if let Some(ref record) = existing {
        if record.fingerprint == fp {
            debug!(path = rel_path, "cache hit, skipping");
            return Ok(FileOutcome::SkippedCached);
        }
    }

    let format = match FileFormat::from_path(abs_path) {
        Some(format) => format,
        None => {
            debug!(path = rel_path, "unsupported format, skipping");
            return Ok(FileOutcome::SkippedUnsupported);
        }
    };

    // Content changed: drop the old version's chunks before writing any
    // new ones so stale and fresh chunks never coexist for a path.
    if existing.is_some() {
        index::delete_by_path(pool, rel_path).await?;
    }

    let text = match convert::convert(format, &bytes) {
        Ok(text) => text,
        Err(ConvertError::Unsupported(_)) => return Ok(FileOutcome::SkippedUnsupported),
        Err(e @ ConvertError::Malformed { .. }) => {
            return Ok(FileOutcome::Failed(FailedFile {
                path: rel_path.to_string(),
                kind: FailureKind::Conversion,
                message: e.to_string(),
            }))
        }
    };

    let spans = chunk_spans(&text, config.chunking.chunk_size, config.chunking.overlap);
    let chunk_count = spans.len();

    // Embed batched per file, upserting as each batch completes. Partial
    // upserts are safe to abandon: no record is written until the end.
    for batch in spans.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
        let vectors = match embed_with_retry(provider, &config.embedding, &texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                return Ok(FileOutcome::Failed(FailedFile {
                    path: rel_path.to_string(),
                    kind: FailureKind::Embedding,
                    message: e.to_string(),
                }))
            }
        };

        let records: Vec<ChunkRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(span, embedding)| ChunkRecord {
                id: format!("{}:{}:{}", rel_path, fp, span.index),
                path: rel_path.to_string(),
                fingerprint: fp.clone(),
                chunk_index: span.index,
                text: span.text.clone(),
                embedding,
            })
            .collect();

        index::upsert_chunks(pool, &records).await?;
    }

    // Vectors first, record last: a missing record means "retry this
    // file", never "half-written and invisible".
    store::put(
        pool,
        &IngestionRecord {
            path: rel_path.to_string(),
            fingerprint: fp,
            format: format.as_str().to_string(),
            ingested_at: chrono::Utc::now().timestamp(),
            chunk_count: chunk_count as i64,
        },
    )
    .await?;

    Ok(FileOutcome::Processed {
        chunks: chunk_count,
    })
}

/// Dry-run pass: fingerprint and cache-check only, no writes.
async fn plan_only(pool: &SqlitePool, files: &[(PathBuf, String)]) -> Result<IngestionSummary> {
    let mut summary = IngestionSummary::default();

    for (abs_path, rel_path) in files {
        if FileFormat::from_path(abs_path).is_none() {
            summary.skipped += 1;
            continue;
        }
        let bytes = match tokio::fs::read(abs_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                summary.failed.push(FailedFile {
                    path: rel_path.clone(),
                    kind: FailureKind::Read,
                    message: e.to_string(),
                });
                continue;
            }
        };
        let fp = fingerprint(&bytes);
        match store::get_current(pool, rel_path).await? {
            Some(record) if record.fingerprint == fp => summary.skipped += 1,
            _ => summary.processed += 1,
        }
    }

    Ok(summary)
}

/// Walk the input directory and return (absolute, relative) paths of
/// candidate files, sorted for deterministic processing order. Dotfiles
/// and excluded globs are skipped.
pub fn scan_input_dir(config: &Config) -> Result<Vec<(PathBuf, String)>> {
    let root = &config.ingest.input_dir;
    if !root.exists() {
        bail!("Input directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.ingest.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.ingest.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(config.ingest.follow_symlinks);

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        // Dotfiles are never ingested.
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push((path.to_path_buf(), rel_str));
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
