//! # docqa
//!
//! A local-first document question-answering pipeline.
//!
//! docqa ingests heterogeneous files (text, markdown, JSON, CSV, HTML,
//! PDF) from a directory, normalizes them to text, chunks and embeds
//! them, and caches everything in SQLite keyed by content fingerprint.
//! Questions are answered by retrieving the most similar chunks and
//! handing a bounded context block to a local chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────────┐   ┌───────────┐
//! │ Directory │──▶│   Pipeline     │──▶│  SQLite   │
//! │   scan    │   │ Convert+Chunk  │   │ records + │
//! │           │   │    +Embed      │   │  vectors  │
//! └───────────┘   └────────────────┘   └─────┬─────┘
//!                                            │
//!                        ┌───────────────────┘
//!                        ▼
//!                  ┌───────────┐   ┌───────────┐
//!                  │ Retrieval │──▶│   Chat    │
//!                  │  (top-k)  │   │  (Ollama) │
//!                  └───────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dqa init                        # create database
//! dqa ingest                      # ingest the input directory
//! dqa ask "What does the report say about Q3?"
//! dqa status                      # cache and index counts
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`fingerprint`] | Content hashing for the ingestion cache |
//! | [`convert`] | Format detection and text normalization |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Ingestion record bookkeeping |
//! | [`index`] | Vector storage and similarity queries |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`retrieve`] | Top-k retrieval and context assembly |
//! | [`answer`] | Prompt assembly and chat completion |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod convert;
pub mod db;
pub mod embedding;
pub mod fingerprint;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod retrieve;
pub mod store;
