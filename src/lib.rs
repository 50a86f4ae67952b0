//! # filesearch-sync
//!
//! Incremental document indexer and grounded query service for a managed
//! file search store (Gemini File Search).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Sources    │──▶│  Diff+Upload │──▶│  File Search │
//! │ local / S3   │   │ hash, retry  │   │    store     │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           │                  │
//!                    ┌──────▼───────┐   ┌──────▼───────┐
//!                    │ index state  │   │  /ask (HTTP) │
//!                    │ + store name │   │  answer+cite │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! fss sync local                # index ./data
//! fss sync object               # index s3://$DOCS_BUCKET/$DOCS_PREFIX
//! fss ask "What is X?"
//! fss serve                     # POST /ask on 127.0.0.1:8000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`traits`] | Seams for sources, state, and the document store |
//! | [`tracker`] | Content hashing and change detection |
//! | [`state`] | Persisted state in a directory or a bucket |
//! | [`store_handle`] | Store creation and lookup |
//! | [`uploader`] | Upload with retry and processing wait |
//! | [`connector_fs`] | Local filesystem source |
//! | [`connector_s3`] | S3-compatible object storage |
//! | [`gemini`] | Gemini File Search REST client |
//! | [`ingest`] | Sync orchestration |
//! | [`query`] | Grounded question answering |
//! | [`server`] | HTTP query endpoint |

pub mod config;
pub mod connector_fs;
pub mod connector_s3;
pub mod error;
pub mod gemini;
pub mod ingest;
pub mod models;
pub mod query;
pub mod server;
pub mod state;
pub mod store_handle;
pub mod tracker;
pub mod traits;
pub mod uploader;
