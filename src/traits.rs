//! Seams between the sync pipeline and the outside world.
//!
//! Each external collaborator sits behind a trait so the orchestrator and
//! the query service can be driven by in-process fakes in tests:
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  DocumentSource  │   │    StateStore    │   │  DocumentStore   │
//! │  local / object  │   │  dir / prefix    │   │  Gemini REST API │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          └──────────────────────┼──────────────────────┘
//!                                 ▼
//!                      run_sync() / QueryService
//! ```
//!
//! [`ObjectStorage`] is the lower-level bucket API shared by the object
//! source and the object-backed state store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::gemini::GenerateContentResponse;
use crate::models::{Candidate, Discovery};

// ═══════════════════════════════════════════════════════════════════════
// Object storage
// ═══════════════════════════════════════════════════════════════════════

/// Listing entry for a single object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
}

/// Minimal bucket API: list by prefix, read, write.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket name, used in log messages and `s3://` style labels.
    fn bucket(&self) -> &str;

    /// List every object under `prefix`, following pagination.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Read an object. Returns `Ok(None)` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write (create or replace) an object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Persisted state
// ═══════════════════════════════════════════════════════════════════════

/// The two logical artifacts persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Plain-text resource name of the file search store.
    StoreName,
    /// JSON object mapping file id to content hash.
    IndexState,
}

/// Where the store handle and the index state live.
///
/// Writes must replace the artifact atomically: readers see either the old
/// or the new content, never a truncated file.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Human-readable location of an artifact (path or `s3://` URL).
    fn location(&self, artifact: Artifact) -> String;

    /// Returns `Ok(None)` if the artifact has never been written.
    async fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>>;

    async fn write(&self, artifact: Artifact, data: &[u8]) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Document sources
// ═══════════════════════════════════════════════════════════════════════

/// A file ready to be handed to the uploader.
///
/// Temporary copies are deleted when the value is dropped, whether or not
/// the upload succeeded.
#[derive(Debug)]
pub enum StagedFile {
    /// The source file itself (local variant).
    InPlace(PathBuf),
    /// A downloaded copy (object-storage variant).
    Temp(NamedTempFile),
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        match self {
            StagedFile::InPlace(path) => path,
            StagedFile::Temp(file) => file.path(),
        }
    }
}

/// Where documents to index come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label used in logs and the run summary (`local`, `object`).
    fn label(&self) -> &str;

    /// Enumerate supported files and hash their content.
    ///
    /// A file that matches but cannot be read lands in
    /// [`Discovery::failed`]; only a failure to enumerate at all is an error.
    async fn discover(&self) -> Result<Discovery>;

    /// Make the candidate's bytes available as a local file for upload.
    async fn stage(&self, candidate: &Candidate) -> Result<StagedFile>;
}

// ═══════════════════════════════════════════════════════════════════════
// Document store
// ═══════════════════════════════════════════════════════════════════════

/// A document upload request.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub display_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// State of a long-running store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub done: bool,
    /// Set when the operation finished unsuccessfully.
    pub error: Option<String>,
}

/// The managed file-search service.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a new store and return its resource name.
    async fn create_store(&self, display_name: &str) -> Result<String>;

    /// Start importing a document into `store`.
    async fn upload(&self, store: &str, request: &UploadRequest) -> Result<Operation>;

    /// Refresh a long-running operation.
    async fn get_operation(&self, name: &str) -> Result<Operation>;

    /// Generate an answer grounded on the documents in `store`.
    async fn generate(
        &self,
        model: &str,
        store: &str,
        query: &str,
    ) -> Result<GenerateContentResponse>;
}
