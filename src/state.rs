//! Persisted state backends.
//!
//! - [`LocalStateStore`] keeps `.store_name` and `.indexed_files.json` in a
//!   directory. Writes go to a temp file in the same directory and are then
//!   renamed over the target, so a crash never leaves a partial file.
//! - [`ObjectStateStore`] keeps the same artifacts as objects under a prefix
//!   in a bucket. A single PUT replaces an object atomically.

use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ObjectSourceConfig;
use crate::error::Result;
use crate::traits::{Artifact, ObjectStorage, StateStore};

pub const LOCAL_STORE_NAME_FILE: &str = ".store_name";
pub const LOCAL_INDEX_STATE_FILE: &str = ".indexed_files.json";

pub struct LocalStateStore {
    dir: PathBuf,
}

impl LocalStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, artifact: Artifact) -> PathBuf {
        match artifact {
            Artifact::StoreName => self.dir.join(LOCAL_STORE_NAME_FILE),
            Artifact::IndexState => self.dir.join(LOCAL_INDEX_STATE_FILE),
        }
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    fn location(&self, artifact: Artifact) -> String {
        self.path(artifact).display().to_string()
    }

    async fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(artifact)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, artifact: Artifact, data: &[u8]) -> Result<()> {
        let dir = self.dir.clone();
        let target = self.path(artifact);
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::Builder::new()
                .prefix(".fss-state-")
                .tempfile_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(())
    }
}

pub struct ObjectStateStore {
    storage: Arc<dyn ObjectStorage>,
    store_name_key: String,
    index_state_key: String,
}

impl ObjectStateStore {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &ObjectSourceConfig) -> Self {
        Self {
            storage,
            store_name_key: config.store_name_key(),
            index_state_key: config.index_state_key(),
        }
    }

    fn key(&self, artifact: Artifact) -> &str {
        match artifact {
            Artifact::StoreName => &self.store_name_key,
            Artifact::IndexState => &self.index_state_key,
        }
    }
}

#[async_trait]
impl StateStore for ObjectStateStore {
    fn location(&self, artifact: Artifact) -> String {
        format!("s3://{}/{}", self.storage.bucket(), self.key(artifact))
    }

    async fn read(&self, artifact: Artifact) -> Result<Option<Vec<u8>>> {
        self.storage.get(self.key(artifact)).await
    }

    async fn write(&self, artifact: Artifact, data: &[u8]) -> Result<()> {
        let content_type = match artifact {
            Artifact::StoreName => "text/plain",
            Artifact::IndexState => "application/json",
        };
        self.storage
            .put(self.key(artifact), data.to_vec(), content_type)
            .await
    }
}
