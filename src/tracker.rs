//! Change tracking.
//!
//! Decides which files need uploading by comparing a SHA-256 of each file's
//! bytes against the hash recorded when it was last accepted by the store.
//! Hashes depend only on content, never on names or timestamps, so touching
//! or renaming a file without changing its bytes does not change its hash.
//!
//! The persisted [`IndexState`] only ever gains an entry after the store
//! confirmed the upload (see [`commit`]); anything missing or stale is
//! retried on the next run.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{IndexState, IndexedFileRecord};
use crate::traits::{Artifact, StateStore};

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 of a file, read in 8 KiB blocks.
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Result of comparing candidates against the known state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// New or changed ids, sorted lexicographically.
    pub to_upload: Vec<String>,
    pub unchanged: BTreeSet<String>,
}

/// Hash each candidate's content and compare with `known`.
///
/// Duplicate ids collapse to the last occurrence.
pub fn diff<I, S, C>(candidates: I, known: &IndexState) -> Diff
where
    I: IntoIterator<Item = (S, C)>,
    S: Into<String>,
    C: AsRef<[u8]>,
{
    diff_hashed(
        candidates
            .into_iter()
            .map(|(id, content)| (id.into(), content_hash(content.as_ref()))),
        known,
    )
}

/// Like [`diff`], with hashes already computed.
pub fn diff_hashed<I>(candidates: I, known: &IndexState) -> Diff
where
    I: IntoIterator<Item = (String, String)>,
{
    let hashed: BTreeMap<String, String> = candidates.into_iter().collect();

    let mut result = Diff::default();
    for (id, hash) in hashed {
        match known.get(&id) {
            Some(old) if *old == hash => {
                result.unchanged.insert(id);
            }
            _ => result.to_upload.push(id),
        }
    }
    result
}

/// Record `id -> hash` as accepted.
pub fn commit(mut known: IndexState, id: &str, hash: &str) -> IndexState {
    known.insert(id.to_string(), hash.to_string());
    known
}

/// Flatten the state into records, in id order.
pub fn records(state: &IndexState) -> Vec<IndexedFileRecord> {
    state
        .iter()
        .map(|(id, hash)| IndexedFileRecord {
            id: id.clone(),
            hash: hash.clone(),
        })
        .collect()
}

/// Loads and saves the [`IndexState`] through a [`StateStore`].
#[derive(Clone)]
pub struct ChangeTracker {
    state: Arc<dyn StateStore>,
}

impl ChangeTracker {
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    /// Read the persisted state. Empty on first run.
    ///
    /// Returns [`Error::StateCorrupt`] if the artifact exists but is not a
    /// JSON object of strings.
    pub async fn load(&self) -> Result<IndexState> {
        let Some(bytes) = self.state.read(Artifact::IndexState).await? else {
            return Ok(IndexState::new());
        };
        serde_json::from_slice(&bytes).map_err(|e| Error::StateCorrupt {
            location: self.state.location(Artifact::IndexState),
            detail: e.to_string(),
        })
    }

    /// [`load`](Self::load), but a corrupt state is logged and replaced by
    /// an empty one. Re-uploading everything is safe; aborting is not useful.
    pub async fn load_or_empty(&self) -> Result<IndexState> {
        match self.load().await {
            Err(err @ Error::StateCorrupt { .. }) => {
                tracing::warn!(
                    error = %err,
                    "ignoring corrupt index state, re-indexing everything"
                );
                Ok(IndexState::new())
            }
            other => other,
        }
    }

    pub async fn save(&self, state: &IndexState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| Error::StateCorrupt {
            location: self.state.location(Artifact::IndexState),
            detail: e.to_string(),
        })?;
        self.state.write(Artifact::IndexState, &json).await
    }
}
