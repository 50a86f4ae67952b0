//! Grounded question answering.
//!
//! [`QueryService`] sends a question to the generation API with a file
//! search tool bound to the store, and turns the grounding metadata into
//! [`Citation`]s in the order the API ranked them. Failures are returned to
//! the caller as-is; nothing is retried at query time.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gemini::GenerateContentResponse;
use crate::models::{Answer, Citation};
use crate::traits::DocumentStore;

const UNKNOWN_SOURCE: &str = "Unknown source";

pub struct QueryService {
    store: Arc<dyn DocumentStore>,
    handle: Option<String>,
    model: String,
    timeout: Duration,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        handle: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            handle,
            model: model.into(),
            timeout,
        }
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }
        let handle = self.handle.as_deref().ok_or(Error::StoreNotConfigured)?;

        let response = tokio::time::timeout(
            self.timeout,
            self.store.generate(&self.model, handle, query),
        )
        .await
        .map_err(|_| Error::Upstream(format!("query timed out after {:?}", self.timeout)))?
        .map_err(|e| Error::Upstream(e.to_string()))?;

        Ok(extract_answer(&response))
    }
}

/// Answer text of the first candidate plus citations from all candidates.
pub fn extract_answer(response: &GenerateContentResponse) -> Answer {
    let answer = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default();

    let citations = response
        .candidates
        .iter()
        .filter_map(|c| c.grounding_metadata.as_ref())
        .flat_map(|gm| gm.grounding_chunks.iter())
        .filter_map(|chunk| chunk.retrieved_context.as_ref())
        .map(|rc| Citation {
            title: rc
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            snippet: rc.text.clone().unwrap_or_default(),
        })
        .collect();

    Answer { answer, citations }
}
