//! Core data types shared by the indexer and the query service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted map of file identifier (relative path or object key) to the
/// hex SHA-256 of the content that was last accepted by the store.
///
/// A `BTreeMap` keeps the serialized JSON sorted by key.
pub type IndexState = BTreeMap<String, String>;

/// One entry of [`IndexState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFileRecord {
    pub id: String,
    pub hash: String,
}

/// A source file discovered during a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Stable identifier used as the tracker key.
    pub id: String,
    /// Name shown by the store in citations (the file's base name).
    pub display_name: String,
    /// Content hash computed at discovery time.
    pub hash: String,
}

/// Result of scanning a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Hashed candidates, sorted by id.
    pub candidates: Vec<Candidate>,
    /// `(id, reason)` for matching files whose content could not be read.
    pub failed: Vec<(String, String)>,
}

/// Outcome of uploading one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub accepted: bool,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(error.into()),
        }
    }
}

/// End-of-run summary for a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub store: String,
    pub discovered: usize,
    pub uploaded: Vec<String>,
    pub unchanged: usize,
    /// `(id, reason)` for each file that was not accepted.
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

/// A grounding source attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub snippet: String,
}

/// Response of the query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
}
