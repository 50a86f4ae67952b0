//! Gemini File Search REST client.
//!
//! Implements [`DocumentStore`] against the Gemini Developer API:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | create store | `POST /v1beta/fileSearchStores` |
//! | upload | `POST /upload/v1beta/{store}:uploadToFileSearchStore` (multipart) |
//! | poll | `GET /v1beta/{operation}` |
//! | query | `POST /v1beta/models/{model}:generateContent` with a `fileSearch` tool |
//!
//! The API key is sent in the `x-goog-api-key` header. This client does not
//! retry; retry policy belongs to the caller.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::{DocumentStore, Operation, UploadRequest};

const SERVICE: &str = "Gemini";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    upload_timeout: Duration,
    query_timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        upload_timeout: Duration,
        query_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| Error::Http {
                service: SERVICE,
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            upload_timeout,
            query_timeout,
        })
    }

    /// Build a client from the loaded configuration.
    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Self::new(
            &config.api.base_url,
            config.api_key()?,
            Duration::from_secs(config.upload.request_timeout_secs),
            Duration::from_secs(config.api.query_timeout_secs),
        )
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let response = request
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| Error::Http {
                service: SERVICE,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: SERVICE,
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        response.json().await.map_err(|e| Error::InvalidResponse {
            service: SERVICE,
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for GeminiClient {
    async fn create_store(&self, display_name: &str) -> Result<String> {
        let body = serde_json::json!({ "displayName": display_name });
        let json = self
            .send_json(
                self.http
                    .post(format!("{}/v1beta/fileSearchStores", self.base_url))
                    .json(&body),
                self.upload_timeout,
            )
            .await?;

        json.get("name")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidResponse {
                service: SERVICE,
                detail: "store response has no name".to_string(),
            })
    }

    async fn upload(&self, store: &str, request: &UploadRequest) -> Result<Operation> {
        let boundary = format!("fss-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, request);

        let json = self
            .send_json(
                self.http
                    .post(format!(
                        "{}/upload/v1beta/{}:uploadToFileSearchStore",
                        self.base_url, store
                    ))
                    .header("X-Goog-Upload-Protocol", "multipart")
                    .header(
                        "Content-Type",
                        format!("multipart/related; boundary={}", boundary),
                    )
                    .body(body),
                self.upload_timeout,
            )
            .await?;

        parse_operation(&json)
    }

    async fn get_operation(&self, name: &str) -> Result<Operation> {
        let json = self
            .send_json(
                self.http.get(format!("{}/v1beta/{}", self.base_url, name)),
                self.upload_timeout,
            )
            .await?;
        parse_operation(&json)
    }

    async fn generate(
        &self,
        model: &str,
        store: &str,
        query: &str,
    ) -> Result<GenerateContentResponse> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": query }] }],
            "tools": [{ "fileSearch": { "fileSearchStoreNames": [store] } }],
        });

        let json = self
            .send_json(
                self.http
                    .post(format!(
                        "{}/v1beta/models/{}:generateContent",
                        self.base_url, model
                    ))
                    .json(&body),
                self.query_timeout,
            )
            .await?;

        serde_json::from_value(json).map_err(|e| Error::InvalidResponse {
            service: SERVICE,
            detail: e.to_string(),
        })
    }
}

/// Encode metadata and file bytes as a `multipart/related` body.
fn multipart_related(boundary: &str, request: &UploadRequest) -> Vec<u8> {
    let metadata = serde_json::json!({
        "displayName": request.display_name,
        "mimeType": request.mime_type,
    });

    let mut body = Vec::with_capacity(request.data.len() + 512);
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            boundary, metadata
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: {}\r\n\r\n",
            boundary, request.mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(&request.data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Parse a `google.longrunning.Operation` JSON object.
fn parse_operation(json: &serde_json::Value) -> Result<Operation> {
    let name = json
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| Error::InvalidResponse {
            service: SERVICE,
            detail: "operation has no name".to_string(),
        })?
        .to_string();

    let done = json.get("done").and_then(|d| d.as_bool()).unwrap_or(false);

    let error = json.get("error").map(|e| {
        let code = e.get("code").and_then(|c| c.as_i64()).unwrap_or_default();
        let message = e
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        format!("code {}: {}", code, message)
    });

    Ok(Operation { name, done, error })
}

// ============ generateContent response ============

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCandidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievedContext {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}
