use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ingest: IngestConfig,
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Directory scanned for source files.
    pub input_dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}
fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum span length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive spans. Must be < chunk_size.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Per-chunk preview limit inside the assembled context.
    #[serde(default = "default_chars_per_chunk")]
    pub context_chars_per_chunk: usize,
    /// Total context budget; lowest-scoring chunks that would overflow
    /// are dropped whole.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_chars_per_chunk: default_chars_per_chunk(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_chars_per_chunk() -> usize {
    2000
}
fn default_max_context_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of: `ollama`, `openai`, `hash`.
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(768),
            base_url: default_ollama_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embed_provider() -> String {
    "ollama".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Only `ollama` is currently supported.
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            model: default_chat_model(),
            base_url: default_ollama_url(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_provider() -> String {
    "ollama".to_string()
}
fn default_chat_model() -> String {
    "qwen3:8b".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.ingest.workers < 1 {
        anyhow::bail!("ingest.workers must be >= 1");
    }

    // Retrieval only works against vectors from the same embedding space,
    // so the provider and model are fixed in config, not switchable per run.
    match config.embedding.provider.as_str() {
        "ollama" | "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be set for provider '{}'",
                    config.embedding.provider
                );
            }
        }
        "hash" => {
            if config.embedding.dims.unwrap_or(0) == 0 {
                anyhow::bail!("embedding.dims must be > 0 for provider 'hash'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama, openai, or hash.",
            other
        ),
    }

    match config.chat.provider.as_str() {
        "ollama" => {}
        other => anyhow::bail!("Unknown chat provider: '{}'. Must be ollama.", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            ingest: IngestConfig {
                input_dir: PathBuf::from("./input"),
                include_globs: default_include_globs(),
                exclude_globs: vec![],
                workers: 4,
                follow_symlinks: false,
            },
            db: DbConfig {
                path: PathBuf::from("./data/docqa.sqlite"),
            },
            chunking: ChunkingConfig {
                chunk_size: 800,
                overlap: 100,
            },
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_overlap_must_be_less_than_size() {
        let mut cfg = base_config();
        cfg.chunking.overlap = 800;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut cfg = base_config();
        cfg.chunking.chunk_size = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_unknown_embedding_provider_rejected() {
        let mut cfg = base_config();
        cfg.embedding.provider = "mystery".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_hash_provider_requires_dims() {
        let mut cfg = base_config();
        cfg.embedding.provider = "hash".to_string();
        cfg.embedding.dims = None;
        assert!(validate(&cfg).is_err());

        cfg.embedding.dims = Some(64);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[ingest]
input_dir = "./docs"

[db]
path = "./data/docqa.sqlite"

[chunking]
chunk_size = 800
overlap = 100
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert!(validate(&cfg).is_ok());
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.embedding.provider, "ollama");
    }
}
