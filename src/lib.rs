//! # E-Cris
//!
//! A retrieval-augmented assistant for corporate crisis management.
//!
//! A small, fixed set of reference documents is chunked, embedded and
//! stored in a SQLite vector index. Questions are answered from the most
//! similar chunks by tree summarization; when retrieval finds nothing
//! relevant or a service fails, the assistant falls back to asking the
//! primary model directly, then a lighter fallback model, and finally to a
//! fixed apology.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │  Loader   │──▶│ Chunk+Embed  │──▶│  SQLite  │
//! │ PDF/text  │   │              │   │  index   │
//! └───────────┘   └──────────────┘   └────┬─────┘
//!                                         │ read-only
//!                 ┌──────────────┐   ┌────▼─────┐
//!   question ────▶│  Assistant   │──▶│Retriever │
//!                 │ tier ladder  │   └──────────┘
//!                 └──────┬───────┘
//!                        ▼
//!                 ┌──────────────┐
//!                 │ Chat models  │
//!                 │primary/fallbk│
//!                 └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ecris build                      # index the configured documents
//! ecris ask "How fast should we respond to a complaint?"
//! ecris serve                      # HTTP API for the dashboard
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Reference document loading |
//! | [`extract`] | PDF and text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index (SQLite and in-memory) |
//! | [`retrieve`] | Similarity retrieval |
//! | [`llm`] | Chat-completion client |
//! | [`synth`] | Tree-summarization answer synthesis |
//! | [`assistant`] | Fallback controller |
//! | [`crisis`] | Crisis threshold policy |
//! | [`ingest`] | Index build orchestration |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assistant;
pub mod chunk;
pub mod config;
pub mod crisis;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod retrieve;
pub mod server;
pub mod sources;
pub mod stats;
pub mod synth;
