//! Store handle resolution.
//!
//! The file search store is created once per deployment and its resource
//! name persisted next to the index state. Two runs starting concurrently
//! on an empty state can each create a store; only one operator at a time
//! is supported.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::{Artifact, DocumentStore, StateStore};

/// Read the persisted handle, if any. Blank content counts as absent.
pub async fn load_handle(state: &dyn StateStore) -> Result<Option<String>> {
    let Some(bytes) = state.read(Artifact::StoreName).await? else {
        return Ok(None);
    };
    let name = String::from_utf8_lossy(&bytes).trim().to_string();
    Ok(if name.is_empty() { None } else { Some(name) })
}

pub struct StoreResolver {
    state: Arc<dyn StateStore>,
    store: Arc<dyn DocumentStore>,
    display_name: String,
}

impl StoreResolver {
    pub fn new(
        state: Arc<dyn StateStore>,
        store: Arc<dyn DocumentStore>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            state,
            store,
            display_name: display_name.into(),
        }
    }

    /// Return the persisted handle, creating and persisting a store first if
    /// there is none.
    pub async fn resolve(&self) -> Result<String> {
        if let Some(name) = load_handle(self.state.as_ref()).await? {
            tracing::info!(store = %name, "using existing file search store");
            return Ok(name);
        }

        tracing::info!(
            location = %self.state.location(Artifact::StoreName),
            display_name = %self.display_name,
            "no store name found, creating a new file search store"
        );
        let name = self
            .store
            .create_store(&self.display_name)
            .await
            .map_err(|e| Error::StoreCreation(e.to_string()))?;
        tracing::info!(store = %name, "created file search store");

        self.state.write(Artifact::StoreName, name.as_bytes()).await?;
        Ok(name)
    }
}
