//! Query-time retrieval and context assembly.
//!
//! Embeds a question in the same vector space as ingestion, pulls the
//! nearest chunks from the index, and formats them into a bounded context
//! block. Zero matches is a normal outcome, not an error: the caller gets
//! an empty [`QueryContext`] and the answer prompt carries a note that no
//! context was found.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::Config;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::index;

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub path: String,
    pub file_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

/// Request-scoped retrieval result, ordered by descending score.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub question: String,
    pub chunks: Vec<RetrievedChunk>,
}

impl QueryContext {
    pub fn empty(question: &str) -> Self {
        Self {
            question: question.to_string(),
            chunks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Retrieve the `k` most similar chunks for a question.
pub async fn retrieve(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    config: &Config,
    question: &str,
    k: usize,
) -> Result<QueryContext> {
    if question.trim().is_empty() {
        return Ok(QueryContext::empty(question));
    }

    let query_vec = embed_query(provider, &config.embedding, question).await?;
    let hits = index::query(pool, &query_vec, k).await?;

    let chunks = hits
        .into_iter()
        .map(|(hit, score)| {
            let file_name = Path::new(&hit.path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| hit.path.clone());
            RetrievedChunk {
                path: hit.path,
                file_name,
                chunk_index: hit.chunk_index,
                text: hit.text,
                score,
            }
        })
        .collect();

    Ok(QueryContext {
        question: question.to_string(),
        chunks,
    })
}

/// Format retrieved chunks into a single bounded context block.
///
/// Each chunk becomes a labeled section with its text capped at
/// `per_chunk_chars`. Sections are emitted in score order until the next
/// one would push the total past `max_total_chars`; the remaining
/// (lower-scoring) chunks are dropped whole rather than truncated
/// mid-chunk.
pub fn assemble_context(
    context: &QueryContext,
    per_chunk_chars: usize,
    max_total_chars: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for chunk in &context.chunks {
        let preview = truncate_chars(chunk.text.trim(), per_chunk_chars);
        let part = format!(
            "--- CONTEXT (file: {}, chunk: {}) ---\n{}\n",
            chunk.file_name, chunk.chunk_index, preview
        );
        let cost = part.chars().count();
        if total + cost > max_total_chars {
            break;
        }
        total += cost;
        parts.push(part);
    }

    parts.join("\n")
}

/// Cap text at `limit` characters, appending a truncation marker.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{}\n\n...[truncated]", cut)
}
