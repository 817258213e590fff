//! End-to-end pipeline tests over a temporary directory and database.
//!
//! These run fully offline: the `hash` embedding provider is deterministic
//! and local, so ingestion and retrieval exercise the real SQLite paths
//! without a model server.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;

use docqa::config::{
    ChatConfig, ChunkingConfig, Config, DbConfig, EmbeddingConfig, IngestConfig, RetrievalConfig,
};
use docqa::ingest::FailureKind;
use docqa::{db, embedding, index, ingest, migrate, retrieve, store};

fn test_config(root: &Path) -> Config {
    Config {
        ingest: IngestConfig {
            input_dir: root.join("files"),
            include_globs: vec!["**/*".to_string()],
            exclude_globs: vec![],
            workers: 2,
            follow_symlinks: false,
        },
        db: DbConfig {
            path: root.join("data").join("dqa.sqlite"),
        },
        chunking: ChunkingConfig {
            chunk_size: 200,
            overlap: 40,
        },
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig {
            provider: "hash".to_string(),
            model: None,
            dims: Some(64),
            ..EmbeddingConfig::default()
        },
        chat: ChatConfig::default(),
    }
}

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    fs::create_dir_all(&config.ingest.input_dir).unwrap();

    let pool = db::connect(&config.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, config, pool)
}

async fn run(config: &Config, pool: &SqlitePool) -> ingest::IngestionSummary {
    let provider = embedding::create_provider(&config.embedding).unwrap();
    ingest::run_ingest(config, pool, provider, None, false)
        .await
        .unwrap()
}

async fn chunks_for_path(pool: &SqlitePool, path: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE path = ?")
        .bind(path)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Minimal valid PDF containing one line of text, with correct xref byte
/// offsets so pdf-extract can parse it.
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 46 >> stream\nBT /F1 12 Tf 100 700 Td (lynx ingestion notes) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

#[tokio::test]
async fn test_empty_directory_yields_empty_summary() {
    let (_tmp, config, pool) = setup().await;

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 0);
    assert!(summary.failed.is_empty());
    assert_eq!(store::count_current(&pool).await.unwrap(), 0);
    assert_eq!(index::count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_second_run_skips_unchanged_files() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(
        files.join("alpha.md"),
        "# Alpha\n\nRust programming notes about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files.join("beta.txt"),
        "Deployment notes covering kubernetes and docker clusters.",
    )
    .unwrap();

    let first = run(&config, &pool).await;
    assert_eq!(first.processed, 2);
    assert!(first.failed.is_empty());

    let chunks_after_first = index::count(&pool).await.unwrap();
    assert!(chunks_after_first >= 2);

    let second = run(&config, &pool).await;
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);

    // Nothing duplicated.
    assert_eq!(index::count(&pool).await.unwrap(), chunks_after_first);
    assert_eq!(store::count_current(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn test_changed_file_replaces_chunks() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;

    let long_v1 = "first version sentence. ".repeat(30);
    fs::write(files.join("doc.txt"), &long_v1).unwrap();
    run(&config, &pool).await;
    let v1_chunks = chunks_for_path(&pool, "doc.txt").await;
    assert!(v1_chunks > 1, "long text should produce multiple chunks");

    // Replace with much shorter content.
    fs::write(files.join("doc.txt"), "short second version").unwrap();
    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 1);

    // Only the new version's chunks remain; one current record per path.
    assert_eq!(chunks_for_path(&pool, "doc.txt").await, 1);
    assert_eq!(store::count_current(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unsupported_extension_skipped_alongside_processed() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join("notes.txt"), "supported plain text").unwrap();
    fs::write(files.join("photo.jpg"), [0xFFu8, 0xD8, 0xFF, 0xE0]).unwrap();

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(store::count_current(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_json_fails_without_aborting_run() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join("good.txt"), "perfectly fine text file").unwrap();
    fs::write(files.join("bad.json"), "{ not json at all").unwrap();

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].path, "bad.json");
    assert_eq!(summary.failed[0].kind, FailureKind::Conversion);

    // The failed file left no chunks and no record behind.
    assert_eq!(chunks_for_path(&pool, "bad.json").await, 0);
    assert!(store::get_current(&pool, "bad.json").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join("plan.txt"), "would be ingested").unwrap();

    let provider = embedding::create_provider(&config.embedding).unwrap();
    let summary = ingest::run_ingest(&config, &pool, provider, None, true)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(store::count_current(&pool).await.unwrap(), 0);
    assert_eq!(index::count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_dotfiles_never_scanned() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join(".env"), "SECRET=hunter2").unwrap();
    fs::write(files.join("visible.txt"), "visible content").unwrap();

    let scanned = ingest::scan_input_dir(&config).unwrap();
    assert_eq!(scanned.len(), 1);
    assert_eq!(scanned[0].1, "visible.txt");

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 1);
}

#[tokio::test]
async fn test_identical_files_keep_separate_chunks() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    let body = "identical duplicate body shared by two paths";
    fs::write(files.join("one.txt"), body).unwrap();
    fs::write(files.join("two.txt"), body).unwrap();

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 2);
    assert_eq!(store::count_current(&pool).await.unwrap(), 2);

    // Same bytes, same fingerprint, but each path must keep its own chunks.
    assert_eq!(chunks_for_path(&pool, "one.txt").await, 1);
    assert_eq!(chunks_for_path(&pool, "two.txt").await, 1);

    // Both copies are retrievable.
    let provider = embedding::create_provider(&config.embedding).unwrap();
    let ctx = retrieve::retrieve(
        &pool,
        provider.as_ref(),
        &config,
        "identical duplicate body",
        2,
    )
    .await
    .unwrap();
    let mut paths: Vec<_> = ctx.chunks.iter().map(|c| c.path.clone()).collect();
    paths.sort();
    assert_eq!(paths, vec!["one.txt".to_string(), "two.txt".to_string()]);

    // And a second run still sees both as cached.
    let second = run(&config, &pool).await;
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn test_retrieval_prefers_matching_document() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(
        files.join("rust.md"),
        "Rust cargo crates borrow checker ownership lifetimes traits.",
    )
    .unwrap();
    fs::write(
        files.join("cooking.md"),
        "Sourdough bread flour yeast proofing oven baking crust.",
    )
    .unwrap();
    run(&config, &pool).await;

    let provider = embedding::create_provider(&config.embedding).unwrap();
    let ctx = retrieve::retrieve(
        &pool,
        provider.as_ref(),
        &config,
        "cargo crates ownership lifetimes",
        2,
    )
    .await
    .unwrap();

    assert!(!ctx.is_empty());
    assert_eq!(ctx.chunks[0].path, "rust.md");
    assert!(ctx.chunks[0].score >= ctx.chunks[1].score);

    // Same question, same ordering.
    let again = retrieve::retrieve(
        &pool,
        provider.as_ref(),
        &config,
        "cargo crates ownership lifetimes",
        2,
    )
    .await
    .unwrap();
    let paths: Vec<_> = ctx.chunks.iter().map(|c| c.path.clone()).collect();
    let paths_again: Vec<_> = again.chunks.iter().map(|c| c.path.clone()).collect();
    assert_eq!(paths, paths_again);
}

#[tokio::test]
async fn test_blank_question_returns_empty_context() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join("doc.txt"), "some indexed content").unwrap();
    run(&config, &pool).await;

    let provider = embedding::create_provider(&config.embedding).unwrap();
    let ctx = retrieve::retrieve(&pool, provider.as_ref(), &config, "   ", 5)
        .await
        .unwrap();
    assert!(ctx.is_empty());
    assert_eq!(retrieve::assemble_context(&ctx, 2000, 12_000), "");
}

#[tokio::test]
async fn test_pdf_ingests_as_single_chunk() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join("data.pdf"), minimal_pdf()).unwrap();

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 1, "failed: {:?}", summary.failed);
    assert_eq!(chunks_for_path(&pool, "data.pdf").await, 1);

    let record = store::get_current(&pool, "data.pdf").await.unwrap().unwrap();
    assert_eq!(record.format, "pdf");
    assert_eq!(record.chunk_count, 1);
}

#[tokio::test]
async fn test_limit_caps_processed_files() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(files.join(name), format!("content of {}", name)).unwrap();
    }

    let provider = embedding::create_provider(&config.embedding).unwrap();
    let summary = ingest::run_ingest(&config, &pool, provider, Some(2), false)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(store::count_current(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn test_interrupted_ingest_resumes_cleanly() {
    let (_tmp, config, pool) = setup().await;
    let files = &config.ingest.input_dir;
    fs::write(files.join("doc.txt"), "resumable content here").unwrap();

    // Simulate a crash after vectors were written but before the record:
    // ingest fully, then delete the record and re-run.
    run(&config, &pool).await;
    sqlx::query("DELETE FROM ingestion_records")
        .execute(&pool)
        .await
        .unwrap();

    let summary = run(&config, &pool).await;
    assert_eq!(summary.processed, 1, "missing record must mean retry");
    assert_eq!(chunks_for_path(&pool, "doc.txt").await, 1);
    assert_eq!(store::count_current(&pool).await.unwrap(), 1);
}
